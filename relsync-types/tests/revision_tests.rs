use relsync_types::Revision;

#[test]
fn first_revision_has_generation_one() {
    let rev = Revision::first();
    assert_eq!(rev.generation(), 1);
    assert_eq!(rev.hash().len(), 32);
}

#[test]
fn next_increments_generation() {
    let rev = Revision::first();
    let next = rev.next();
    assert_eq!(next.generation(), 2);
    assert_ne!(rev.hash(), next.hash());
    assert!(next > rev);
}

#[test]
fn display_and_parse() {
    let rev = Revision::first().next().next();
    let s = rev.to_string();
    assert!(s.starts_with("3-"));
    let parsed: Revision = s.parse().unwrap();
    assert_eq!(parsed, rev);
}

#[test]
fn parse_rejects_garbage() {
    assert!("garbage".parse::<Revision>().is_err());
    assert!("x-abc".parse::<Revision>().is_err());
    assert!("0-abc".parse::<Revision>().is_err());
    assert!("2-".parse::<Revision>().is_err());
}

#[test]
fn ordering_is_generation_then_hash() {
    let low: Revision = "2-ffff".parse().unwrap();
    let high: Revision = "10-0000".parse().unwrap();
    assert!(high > low);

    let a: Revision = "3-aaaa".parse().unwrap();
    let b: Revision = "3-bbbb".parse().unwrap();
    assert!(b > a);
}

#[test]
fn serde_as_string() {
    let rev: Revision = "4-abcd".parse().unwrap();
    let json = serde_json::to_string(&rev).unwrap();
    assert_eq!(json, "\"4-abcd\"");
    let back: Revision = serde_json::from_str(&json).unwrap();
    assert_eq!(back, rev);
}
