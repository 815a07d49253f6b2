//! Codec laws: decode∘encode is identity, ids are stable, canonical
//! tree order is idempotent.

use bstr::BString;
use grit_hash::{HashFormat, ObjectId};
use grit_object::{Blob, Commit, FileMode, Object, ObjectKind, Tag, Tree, TreeEntry};
use grit_utils::{Identity, When};

fn oid(hex: &str) -> ObjectId {
    ObjectId::from_hex(hex).unwrap()
}

#[test]
fn commit_roundtrip_preserves_exact_message_bytes() {
    // Author and committer at 2006-01-02T15:04:05-07:00; the message
    // ends with blank lines that must survive.
    let when = When::new(1136239445, -420);
    let commit = Commit {
        tree: oid("f000000000000000000000000000000000000001"),
        parents: vec![oid("f000000000000000000000000000000000000002")],
        author: Identity::new("John Doe", "john@example.com", when),
        committer: Identity::new("John Doe", "john@example.com", when),
        encoding: None,
        extra_headers: Vec::new(),
        signature: None,
        message: BString::from("Message\n\nFoo\nBar\nWith trailing blank lines\n\n"),
    };

    let encoded = Object::Commit(commit.clone()).encode();
    let id_first = encoded.id(HashFormat::Sha1).unwrap();
    let id_second = Object::Commit(commit.clone())
        .encode()
        .id(HashFormat::Sha1)
        .unwrap();
    assert_eq!(id_first, id_second, "id must be stable across encodes");

    let decoded = match encoded.decode(HashFormat::Sha1).unwrap() {
        Object::Commit(decoded) => decoded,
        other => panic!("expected a commit, decoded {other:?}"),
    };
    assert_eq!(decoded, commit);
    assert_eq!(
        decoded.message,
        "Message\n\nFoo\nBar\nWith trailing blank lines\n\n"
    );
    assert_eq!(decoded.author.when.seconds, 1136239445);
    assert_eq!(decoded.author.when.offset_minutes, -420);
}

#[test]
fn all_kinds_roundtrip_through_encoded_form() {
    let when = When::new(1_600_000_000, 60);
    let blob = Object::Blob(Blob::new(b"binary\0content\xff".to_vec()));
    let tree = Object::Tree(Tree {
        entries: vec![
            TreeEntry::new(
                FileMode::Regular,
                "file.txt",
                oid("aa39a3ee5e6b4b0d3255bfef95601890afd80709"),
            )
            .unwrap(),
            TreeEntry::new(
                FileMode::Dir,
                "dir",
                oid("bb39a3ee5e6b4b0d3255bfef95601890afd80709"),
            )
            .unwrap(),
        ],
    });
    let tag = Object::Tag(Tag {
        target: oid("6ecf0ef2c2dffb796033e5a02219af86ec6584e5"),
        target_kind: ObjectKind::Commit,
        name: BString::from("v1.0.0"),
        tagger: Some(Identity::new("T", "t@example.com", when)),
        message: BString::from("release\n"),
        signature: None,
    });

    for object in [blob, tree, tag] {
        let encoded = object.encode();
        let decoded = encoded.decode(HashFormat::Sha1).unwrap();
        assert_eq!(decoded, object);
        assert_eq!(decoded.encode(), encoded);
    }
}

#[test]
fn sorting_and_reencoding_a_tree_is_idempotent() {
    // Entries deliberately out of canonical order.
    let id = oid("da39a3ee5e6b4b0d3255bfef95601890afd80709");
    let tree = Tree {
        entries: vec![
            TreeEntry::new(FileMode::Regular, "zebra.txt", id).unwrap(),
            TreeEntry::new(FileMode::Dir, "foo", id).unwrap(),
            TreeEntry::new(FileMode::Regular, "foo.c", id).unwrap(),
            TreeEntry::new(FileMode::Regular, "foo-bar", id).unwrap(),
        ],
    };

    let canonical = tree.serialize_content();
    let reread = Tree::parse(&canonical, HashFormat::Sha1).unwrap();
    assert_eq!(reread.serialize_content(), canonical);

    // Canonical order: "foo-bar" < "foo.c" < "foo" (dir sorts as
    // "foo/") < "zebra.txt".
    let names: Vec<&str> = reread
        .entries
        .iter()
        .map(|e| std::str::from_utf8(&e.name).unwrap())
        .collect();
    assert_eq!(names, vec!["foo-bar", "foo.c", "foo", "zebra.txt"]);
}

#[test]
fn known_object_id_vector() {
    // `git hash-object` agreement on a well-known blob.
    let blob = Object::Blob(Blob::new(b"what is up, doc?".to_vec()));
    assert_eq!(
        blob.compute_id(HashFormat::Sha1).unwrap().to_hex(),
        "bd9dbf5aae1a3862dd1526723246b20206e5fc37"
    );
}

#[test]
fn commit_with_everything_roundtrips() {
    let when = When::new(1_700_000_000, -330);
    let commit = Commit {
        tree: oid("f000000000000000000000000000000000000001"),
        parents: vec![
            oid("f000000000000000000000000000000000000002"),
            oid("f000000000000000000000000000000000000003"),
        ],
        author: Identity::new("Åsa Öberg", "asa@example.com", when),
        committer: Identity::new("Someone Else", "else@example.com", when),
        encoding: Some(BString::from("ISO-8859-1")),
        extra_headers: vec![(
            BString::from("mergetag"),
            BString::from("object f000000000000000000000000000000000000002\ntype commit\ntag v9"),
        )],
        signature: Some(grit_object::CommitSignature {
            format: grit_object::SignatureFormat::Gpg,
            data: BString::from(
                "-----BEGIN PGP SIGNATURE-----\n\nabc123\n-----END PGP SIGNATURE-----",
            ),
        }),
        message: BString::from("Merge tag 'v9'\n"),
    };

    let bytes = commit.serialize_content();
    let decoded = Commit::parse(&bytes).unwrap();
    assert_eq!(decoded, commit);
    assert_eq!(decoded.serialize_content(), bytes);
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn blob_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let blob = Object::Blob(Blob::new(data.clone()));
            let encoded = blob.encode();
            prop_assert_eq!(encoded.size(), data.len());
            prop_assert_eq!(encoded.decode(HashFormat::Sha1).unwrap(), blob);
        }

        #[test]
        fn commit_message_roundtrip(message in "[^\u{0}]{0,200}") {
            // Any NUL-free message survives encode/decode byte-exactly.
            let when = When::new(1_600_000_000, 0);
            let commit = Commit {
                tree: oid("f000000000000000000000000000000000000001"),
                parents: Vec::new(),
                author: Identity::new("P", "p@example.com", when),
                committer: Identity::new("P", "p@example.com", when),
                encoding: None,
                extra_headers: Vec::new(),
                signature: None,
                message: BString::from(message.as_bytes()),
            };
            let decoded = Commit::parse(&commit.serialize_content()).unwrap();
            prop_assert_eq!(decoded.message, commit.message);
        }
    }
}
