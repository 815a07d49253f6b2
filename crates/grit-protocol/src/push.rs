//! The receive-pack (push) client.
//!
//! Resolves push refspecs into `(old, new, name)` command triples
//! against the server's advertisement, refuses non-fast-forwards
//! locally unless forced, streams a pack holding exactly the objects
//! reachable from the new tips but not from what the remote already
//! has, and reports per-ref results from the server's report-status.

use std::collections::{HashSet, VecDeque};
use std::io::Write;

use bstr::ByteSlice;
use grit_hash::ObjectId;
use grit_object::{Commit, ObjectKind, Tree};
use grit_odb::Odb;
use grit_pack::write::PackBytesWriter;
use grit_ref::{RefSpec, RefStore};
use grit_transport::Transport;
use grit_utils::CancelToken;

use crate::advert::Advertisement;
use crate::capability;
use crate::fetch::is_ancestor;
use crate::pktline::{PktReader, PktWriter};
use crate::ProtocolError;

/// What to push.
#[derive(Debug, Clone, Default)]
pub struct PushOptions {
    pub refspecs: Vec<RefSpec>,
}

/// Per-ref outcome of a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefResult {
    /// The remote ref name.
    pub name: String,
    pub status: RefStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefStatus {
    /// The server accepted the update.
    Ok,
    /// The server refused (`ng <name> <reason>`).
    Rejected(String),
    /// Refused locally before anything was sent.
    NonFastForward,
}

/// Result of a push.
#[derive(Debug)]
pub enum PushOutcome {
    /// Every selected ref already matched.
    UpToDate,
    Pushed(Vec<RefResult>),
}

struct Command {
    old: ObjectId,
    new: ObjectId,
    name: String,
}

/// Run a push over an already-connected transport.
pub fn push(
    transport: &mut dyn Transport,
    odb: &Odb,
    refs: &dyn RefStore,
    options: &PushOptions,
    cancel: &CancelToken,
) -> Result<PushOutcome, ProtocolError> {
    let advert = {
        let mut reader = PktReader::new(transport.reader());
        Advertisement::parse(&mut reader)?
    };
    cancel.check()?;

    let zero = odb.format().zero();
    let mut commands: Vec<Command> = Vec::new();
    let mut results: Vec<RefResult> = Vec::new();

    for (local_name, dst_name, new) in resolve_sources(refs, &options.refspecs, zero)? {
        let old = advert.find(&dst_name).unwrap_or(zero);
        if old == new {
            continue;
        }

        // Local fast-forward gate; the leading '+' bypasses it. The
        // server enforces its own policy regardless.
        let force = options
            .refspecs
            .iter()
            .any(|s| s.is_force() && s.destination(&local_name).as_deref() == Some(dst_name.as_str()));
        if !force && !old.is_zero() && !new.is_zero() && !is_ancestor(odb, &old, &new)? {
            results.push(RefResult {
                name: dst_name,
                status: RefStatus::NonFastForward,
            });
            continue;
        }

        commands.push(Command {
            old,
            new,
            name: dst_name,
        });
    }

    if commands.is_empty() {
        let mut writer = PktWriter::new(transport.writer());
        writer.write_flush()?;
        writer.flush()?;
        return Ok(if results.is_empty() {
            PushOutcome::UpToDate
        } else {
            PushOutcome::Pushed(results)
        });
    }

    let caps = capability::negotiate_push(&advert.capabilities);
    advert.capabilities.require(&caps)?;
    let report_status = advert.capabilities.has("report-status");

    // Command list; capabilities ride the first line after a NUL.
    {
        let mut writer = PktWriter::new(transport.writer());
        for (i, cmd) in commands.iter().enumerate() {
            let line = format!("{} {} {}", cmd.old.to_hex(), cmd.new.to_hex(), cmd.name);
            if i == 0 {
                let mut payload = line.into_bytes();
                payload.push(0);
                payload.extend_from_slice(caps.join(" ").as_bytes());
                payload.push(b'\n');
                writer.write_pkt(&payload)?;
            } else {
                writer.write_text(&line)?;
            }
        }
        writer.write_flush()?;
        writer.flush()?;
    }

    // The pack: objects reachable from the new tips, minus everything
    // reachable from refs the remote advertised. Deletes need no pack.
    let new_tips: Vec<ObjectId> = commands
        .iter()
        .map(|c| c.new)
        .filter(|id| !id.is_zero())
        .collect();
    if !new_tips.is_empty() {
        let mut known_remote: HashSet<ObjectId> = advert
            .refs
            .iter()
            .map(|(id, _)| *id)
            .filter(|id| odb.has(id))
            .collect();
        for cmd in &commands {
            if !cmd.old.is_zero() && odb.has(&cmd.old) {
                known_remote.insert(cmd.old);
            }
        }

        let objects = reachable_objects(odb, &new_tips, &known_remote, cancel)?;
        let mut pack = PackBytesWriter::new(odb.format());
        for (kind, data) in &objects {
            cancel.check()?;
            pack.add_object(*kind, data)?;
        }
        let (bytes, _checksum) = pack.finish()?;
        transport.writer().write_all(&bytes)?;
    }
    transport.finish_request()?;

    // Per-command verdicts.
    if report_status {
        let mut reader = PktReader::new(transport.reader());
        loop {
            cancel.check()?;
            match reader.read_text_line()? {
                None => break,
                Some(line) => {
                    if line == b"unpack ok" {
                        continue;
                    }
                    if let Some(reason) = line.strip_prefix(b"unpack ") {
                        return Err(ProtocolError::ServerError(format!(
                            "unpack failed: {}",
                            reason.as_bstr()
                        )));
                    }
                    if let Some(name) = line.strip_prefix(b"ok ") {
                        results.push(RefResult {
                            name: String::from_utf8_lossy(name).into_owned(),
                            status: RefStatus::Ok,
                        });
                        continue;
                    }
                    if let Some(rest) = line.strip_prefix(b"ng ") {
                        let (name, reason) = match rest.find_byte(b' ') {
                            Some(space) => (&rest[..space], &rest[space + 1..]),
                            None => (rest, &b""[..]),
                        };
                        results.push(RefResult {
                            name: String::from_utf8_lossy(name).into_owned(),
                            status: RefStatus::Rejected(
                                String::from_utf8_lossy(reason).into_owned(),
                            ),
                        });
                        continue;
                    }
                    return Err(ProtocolError::NegotiationFailed(format!(
                        "unexpected report-status line: {:?}",
                        line.as_bstr()
                    )));
                }
            }
        }
    } else {
        // Without report-status the best signal is a clean stream end.
        for cmd in &commands {
            results.push(RefResult {
                name: cmd.name.clone(),
                status: RefStatus::Ok,
            });
        }
    }

    Ok(PushOutcome::Pushed(results))
}

/// Resolve the refspecs to `(local name, remote name, new id)` triples.
///
/// An empty source pushes a deletion (`:refs/heads/gone`).
fn resolve_sources(
    refs: &dyn RefStore,
    refspecs: &[RefSpec],
    zero: ObjectId,
) -> Result<Vec<(String, String, ObjectId)>, ProtocolError> {
    let mut out = Vec::new();
    for spec in refspecs {
        if spec.src().is_empty() {
            out.push((String::new(), spec.dst().to_string(), zero));
            continue;
        }
        if spec.is_wildcard() {
            for reference in refs.iter()? {
                let name = reference.name().as_str().to_string();
                if let Some(dst) = spec.destination(&name) {
                    let id = refs.resolve(reference.name())?;
                    out.push((name, dst, id));
                }
            }
        } else {
            let name = grit_ref::RefName::new(spec.src())?;
            let id = refs.resolve(&name)?;
            out.push((
                spec.src().to_string(),
                spec.destination(spec.src()).expect("exact spec matches"),
                id,
            ));
        }
    }
    Ok(out)
}

/// Every object reachable from `tips` but not from `stops`: commits
/// first (oldest to newest), then their trees, then blobs and tags.
fn reachable_objects(
    odb: &Odb,
    tips: &[ObjectId],
    stops: &HashSet<ObjectId>,
    cancel: &CancelToken,
) -> Result<Vec<(ObjectKind, Vec<u8>)>, ProtocolError> {
    let mut commits: Vec<(ObjectId, Commit)> = Vec::new();
    let mut tags: Vec<Vec<u8>> = Vec::new();
    let mut queue: VecDeque<ObjectId> = VecDeque::new();
    let mut seen: HashSet<ObjectId> = HashSet::new();

    for tip in tips {
        if seen.insert(*tip) && !stops.contains(tip) {
            queue.push_back(*tip);
        }
    }
    while let Some(id) = queue.pop_front() {
        cancel.check()?;
        let encoded = odb.get(None, &id)?;
        // An annotated-tag tip ships the tag object and follows its
        // target.
        if encoded.kind == ObjectKind::Tag {
            let tag = grit_object::Tag::parse(&encoded.data)?;
            tags.push(encoded.data);
            if seen.insert(tag.target) && !stops.contains(&tag.target) {
                queue.push_back(tag.target);
            }
            continue;
        }
        let commit = Commit::parse(&encoded.data)?;
        for parent in &commit.parents {
            if seen.insert(*parent) && !stops.contains(parent) && odb.has(parent) {
                queue.push_back(*parent);
            }
        }
        commits.push((id, commit));
    }
    // Parents precede children in the emitted pack.
    commits.reverse();

    // Trees reachable from the stop set are already on the remote.
    let mut remote_trees: HashSet<ObjectId> = HashSet::new();
    for stop in stops {
        if let Ok(encoded) = odb.get(Some(ObjectKind::Commit), stop) {
            if let Ok(commit) = Commit::parse(&encoded.data) {
                collect_tree(odb, &commit.tree, &mut remote_trees, &mut Vec::new())?;
            }
        }
    }

    let mut objects: Vec<(ObjectKind, Vec<u8>)> = Vec::new();
    let mut sent: HashSet<ObjectId> = HashSet::new();
    let mut tree_objects: Vec<(ObjectKind, Vec<u8>)> = Vec::new();

    for (_, commit) in &commits {
        cancel.check()?;
        if remote_trees.contains(&commit.tree) || !sent.insert(commit.tree) {
            continue;
        }
        let mut pending = vec![commit.tree];
        while let Some(tree_id) = pending.pop() {
            let encoded = odb.get(Some(ObjectKind::Tree), &tree_id)?;
            let tree = Tree::parse(&encoded.data, odb.format())?;
            tree_objects.push((ObjectKind::Tree, encoded.data));
            for entry in &tree.entries {
                if entry.mode.is_submodule() {
                    continue;
                }
                if remote_trees.contains(&entry.id) || !sent.insert(entry.id) {
                    continue;
                }
                if entry.mode.is_dir() {
                    pending.push(entry.id);
                } else {
                    let blob = odb.get(None, &entry.id)?;
                    tree_objects.push((blob.kind, blob.data));
                }
            }
        }
    }

    for (_, commit) in &commits {
        objects.push((ObjectKind::Commit, commit.serialize_content()));
    }
    objects.extend(tree_objects);
    for tag in tags {
        objects.push((ObjectKind::Tag, tag));
    }
    Ok(objects)
}

/// Record a tree and its entire closure into `set`.
fn collect_tree(
    odb: &Odb,
    tree_id: &ObjectId,
    set: &mut HashSet<ObjectId>,
    scratch: &mut Vec<ObjectId>,
) -> Result<(), ProtocolError> {
    if !set.insert(*tree_id) {
        return Ok(());
    }
    scratch.push(*tree_id);
    while let Some(id) = scratch.pop() {
        let Ok(encoded) = odb.get(Some(ObjectKind::Tree), &id) else {
            continue;
        };
        let tree = Tree::parse(&encoded.data, odb.format())?;
        for entry in &tree.entries {
            if set.insert(entry.id) && entry.mode.is_dir() {
                scratch.push(entry.id);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bstr::BString;
    use grit_hash::HashFormat;
    use grit_object::{FileMode, Object, TreeEntry};
    use grit_utils::{Identity, When};

    struct Repo {
        odb: Odb,
        _dir: tempfile::TempDir,
    }

    impl Repo {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            Self {
                odb: Odb::open(dir.path(), HashFormat::Sha1).unwrap(),
                _dir: dir,
            }
        }

        fn blob(&self, data: &[u8]) -> ObjectId {
            self.odb.put_raw(ObjectKind::Blob, data).unwrap()
        }

        fn tree(&self, files: &[(&str, ObjectId)]) -> ObjectId {
            let entries = files
                .iter()
                .map(|(name, id)| TreeEntry::new(FileMode::Regular, *name, *id).unwrap())
                .collect();
            self.odb
                .put_raw(ObjectKind::Tree, &Tree { entries }.serialize_content())
                .unwrap()
        }

        fn commit(&self, tree: ObjectId, parents: &[ObjectId], time: i64) -> ObjectId {
            let who = Identity::new("P", "p@example.com", When::new(time, 0));
            self.odb
                .put(
                    &Object::Commit(Commit {
                        tree,
                        parents: parents.to_vec(),
                        author: who.clone(),
                        committer: who,
                        encoding: None,
                        extra_headers: Vec::new(),
                        signature: None,
                        message: BString::from("m\n"),
                    })
                    .encode(),
                )
                .unwrap()
        }
    }

    #[test]
    fn reachable_objects_exclude_remote_side() {
        let repo = Repo::new();

        let shared_blob = repo.blob(b"shared");
        let old_tree = repo.tree(&[("shared.txt", shared_blob)]);
        let old_commit = repo.commit(old_tree, &[], 100);

        let new_blob = repo.blob(b"new content");
        let new_tree = repo.tree(&[("shared.txt", shared_blob), ("new.txt", new_blob)]);
        let new_commit = repo.commit(new_tree, &[old_commit], 200);

        let stops: HashSet<ObjectId> = [old_commit].into_iter().collect();
        let objects = reachable_objects(
            &repo.odb,
            &[new_commit],
            &stops,
            &CancelToken::new(),
        )
        .unwrap();

        let kinds: Vec<ObjectKind> = objects.iter().map(|(k, _)| *k).collect();
        // One new commit, one new tree, one new blob. The shared blob and
        // old tree stay home.
        assert_eq!(kinds, vec![ObjectKind::Commit, ObjectKind::Tree, ObjectKind::Blob]);
        assert!(objects.iter().any(|(_, data)| data == b"new content"));
        assert!(!objects.iter().any(|(_, data)| data == b"shared"));
    }

    #[test]
    fn reachable_objects_for_new_branch_include_everything() {
        let repo = Repo::new();
        let blob = repo.blob(b"root file");
        let tree = repo.tree(&[("f.txt", blob)]);
        let c1 = repo.commit(tree, &[], 100);
        let c2 = repo.commit(tree, &[c1], 200);

        let objects =
            reachable_objects(&repo.odb, &[c2], &HashSet::new(), &CancelToken::new())
                .unwrap();

        let commits = objects
            .iter()
            .filter(|(k, _)| *k == ObjectKind::Commit)
            .count();
        let trees = objects
            .iter()
            .filter(|(k, _)| *k == ObjectKind::Tree)
            .count();
        let blobs = objects
            .iter()
            .filter(|(k, _)| *k == ObjectKind::Blob)
            .count();
        assert_eq!((commits, trees, blobs), (2, 1, 1));

        // Parents come before children.
        let first_commit = objects
            .iter()
            .position(|(k, _)| *k == ObjectKind::Commit)
            .unwrap();
        let parsed = Commit::parse(&objects[first_commit].1).unwrap();
        assert!(parsed.parents.is_empty());
    }

    #[test]
    fn deletion_refspec_resolves_to_zero_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = grit_ref::FilesRefStore::new(dir.path());
        let spec = RefSpec::parse(":refs/heads/gone").unwrap();

        let sources =
            resolve_sources(&store, &[spec], ObjectId::ZERO_SHA1).unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].1, "refs/heads/gone");
        assert!(sources[0].2.is_zero());
    }
}
