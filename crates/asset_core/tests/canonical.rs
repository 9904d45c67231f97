use asset_core::canonicalize_url;
use pretty_assertions::assert_eq;

#[test]
fn tracking_params_do_not_change_identity() {
    let a = canonicalize_url("https://cdn.example.com/abyss/board.jpg?utm_source=a").unwrap();
    let b = canonicalize_url("https://cdn.example.com/abyss/board.jpg?utm_source=b").unwrap();
    assert_eq!(a, b);
    assert_eq!(a, "https://cdn.example.com/abyss/board.jpg");
}

#[test]
fn rendition_params_and_fragment_are_stripped() {
    let canonical =
        canonicalize_url("HTTPS://CDN.Example.com:443/img.png?w=300&h=200&fbclid=zz#top").unwrap();
    assert_eq!(canonical, "https://cdn.example.com/img.png");
}

#[test]
fn meaningful_params_survive_in_sorted_order() {
    let canonical =
        canonicalize_url("https://example.com/image.php?id=42&gclid=x&file=board").unwrap();
    assert_eq!(canonical, "https://example.com/image.php?file=board&id=42");
}

#[test]
fn canonicalization_is_idempotent() {
    let once = canonicalize_url("https://example.com/a.png?b=2&a=1&utm_medium=x").unwrap();
    let twice = canonicalize_url(&once).unwrap();
    assert_eq!(once, twice);
}
