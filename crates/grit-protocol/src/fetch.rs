//! The upload-pack (fetch) client.
//!
//! Drives the v1 exchange: parse the ref advertisement, send wants
//! (capabilities on the first line only) plus shallow/deepen lines, read
//! the server's shallow updates, negotiate haves in batches of 32 in
//! descending committer-time order, send `done`, and stream the pack —
//! side-band demultiplexed when negotiated — through the store's
//! verifying pack sink. Local refs then advance per the refspecs.

use std::collections::HashSet;
use std::io::Write;

use bstr::ByteSlice;
use grit_hash::ObjectId;
use grit_object::{Commit, ObjectKind};
use grit_odb::{InstalledPack, Odb};
use grit_ref::{RefName, RefSpec, RefStore, Reference};
use grit_transport::Transport;
use grit_utils::CancelToken;

use crate::advert::Advertisement;
use crate::capability::{self, SidebandMode};
use crate::pktline::{Pkt, PktReader, PktWriter};
use crate::shallow::ShallowSet;
use crate::sideband::SidebandReader;
use crate::ProtocolError;

/// Haves per negotiation round.
const HAVE_BATCH: usize = 32;
/// Upper bound on haves sent in total before giving up on finding a
/// better common base.
const MAX_HAVES: usize = 256;

/// What to fetch and how.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Which remote refs to fetch and where they map locally.
    pub refspecs: Vec<RefSpec>,
    /// Truncate history at this depth (`deepen N`).
    pub depth: Option<u32>,
    /// Truncate history at this commit time (`deepen-since`).
    pub deepen_since: Option<i64>,
    /// Exclude history reachable from these remote refs (`deepen-not`).
    pub deepen_not: Vec<String>,
    /// Allow the server to send deltas against objects we already have.
    pub thin_pack: bool,
}

/// One applied ref update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUpdate {
    pub name: RefName,
    pub old: Option<ObjectId>,
    pub new: ObjectId,
}

/// Result of a fetch.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Nothing to transfer and no ref moved.
    UpToDate,
    /// Objects and/or refs changed.
    Fetched(FetchSummary),
}

#[derive(Debug)]
pub struct FetchSummary {
    /// The installed pack, when the server sent one.
    pub pack: Option<InstalledPack>,
    pub updated_refs: Vec<RefUpdate>,
    /// Commits that became shallow boundaries.
    pub new_shallow: Vec<ObjectId>,
    /// Former boundaries whose parents are now complete.
    pub unshallowed: Vec<ObjectId>,
}

/// Run a fetch over an already-connected transport.
pub fn fetch(
    transport: &mut dyn Transport,
    odb: &Odb,
    refs: &dyn RefStore,
    shallow: &mut ShallowSet,
    options: &FetchOptions,
    cancel: &CancelToken,
    progress: Option<&mut dyn FnMut(&[u8])>,
) -> Result<FetchOutcome, ProtocolError> {
    let advert = {
        let mut reader = PktReader::new(transport.reader());
        Advertisement::parse(&mut reader)?
    };
    cancel.check()?;

    // Wants: advertised refs selected by the refspecs whose objects we
    // lack; ref updates cover matching refs we already have too.
    let mut wants: Vec<ObjectId> = Vec::new();
    let mut planned_updates: Vec<(RefSpec, RefName, ObjectId)> = Vec::new();
    for (id, name) in &advert.refs {
        let Ok(name_str) = std::str::from_utf8(name.as_bstr()) else {
            continue;
        };
        for spec in &options.refspecs {
            let Some(dst) = spec.destination(name_str) else {
                continue;
            };
            planned_updates.push((spec.clone(), RefName::new(dst)?, *id));
            if !odb.has(id) && !wants.contains(id) {
                wants.push(*id);
            }
        }
    }

    if wants.is_empty() {
        // No objects needed; refs may still move (e.g. a remote reset to
        // an older commit we hold).
        let mut writer = PktWriter::new(transport.writer());
        writer.write_flush()?;
        writer.flush()?;
        let updated = apply_updates(odb, refs, &planned_updates)?;
        return Ok(if updated.is_empty() {
            FetchOutcome::UpToDate
        } else {
            FetchOutcome::Fetched(FetchSummary {
                pack: None,
                updated_refs: updated,
                new_shallow: Vec::new(),
                unshallowed: Vec::new(),
            })
        });
    }

    let caps = capability::negotiate_fetch(&advert.capabilities, options.thin_pack);
    advert.capabilities.require(&caps)?;
    require_shallow_caps(&advert.capabilities, options, shallow)?;

    let sideband = capability::select_sideband(&advert.capabilities);
    let multi_ack = advert.capabilities.has("multi_ack_detailed")
        || advert.capabilities.has("multi_ack");
    let deepening = options.depth.is_some()
        || options.deepen_since.is_some()
        || !options.deepen_not.is_empty();

    // Wants, shallow state, deepen requests.
    {
        let mut writer = PktWriter::new(transport.writer());
        for (i, want) in wants.iter().enumerate() {
            if i == 0 {
                writer.write_text(&format!("want {} {}", want.to_hex(), caps.join(" ")))?;
            } else {
                writer.write_text(&format!("want {}", want.to_hex()))?;
            }
        }
        for id in shallow.sorted() {
            writer.write_text(&format!("shallow {}", id.to_hex()))?;
        }
        if let Some(depth) = options.depth {
            writer.write_text(&format!("deepen {depth}"))?;
        }
        if let Some(since) = options.deepen_since {
            writer.write_text(&format!("deepen-since {since}"))?;
        }
        for not in &options.deepen_not {
            writer.write_text(&format!("deepen-not {not}"))?;
        }
        writer.write_flush()?;
        writer.flush()?;
    }

    // The server's shallow/unshallow section (only when deepening).
    let mut new_shallow = Vec::new();
    let mut unshallowed = Vec::new();
    if deepening {
        transport.finish_request()?;
        let mut reader = PktReader::new(transport.reader());
        loop {
            cancel.check()?;
            match reader.read_pkt()? {
                Pkt::Flush => break,
                Pkt::Data(line) => {
                    let text = trim_newline(&line);
                    if let Some(hex) = strip_prefix(text, b"shallow ") {
                        let id = parse_id(hex)?;
                        shallow.insert(id);
                        new_shallow.push(id);
                    } else if let Some(hex) = strip_prefix(text, b"unshallow ") {
                        let id = parse_id(hex)?;
                        shallow.remove(&id);
                        unshallowed.push(id);
                    } else {
                        return Err(ProtocolError::NegotiationFailed(format!(
                            "unexpected line in shallow section: {:?}",
                            text.as_bstr()
                        )));
                    }
                }
                _ => {
                    return Err(ProtocolError::NegotiationFailed(
                        "unexpected packet in shallow section".into(),
                    ))
                }
            }
        }
    }

    // Haves, newest first, to maximize the chance of an early common.
    let haves = local_haves(odb, refs)?;
    let mut ready = false;

    if multi_ack && !transport.is_stateless() {
        let mut sent = 0;
        'rounds: for batch in haves.chunks(HAVE_BATCH) {
            cancel.check()?;
            {
                let mut writer = PktWriter::new(transport.writer());
                for have in batch {
                    writer.write_text(&format!("have {}", have.to_hex()))?;
                }
                writer.write_flush()?;
                writer.flush()?;
            }
            sent += batch.len();

            // One NAK terminates each round; a ready ACK ends the search.
            let mut reader = PktReader::new(transport.reader());
            loop {
                match reader.read_text_line()? {
                    None => {}
                    Some(line) => {
                        if line == b"NAK" {
                            break;
                        }
                        if line.starts_with(b"ACK ") && line.ends_with(b"ready") {
                            ready = true;
                            break 'rounds;
                        }
                        // ACK common/continue: noted, keep reading.
                    }
                }
                if ready {
                    break;
                }
            }
            if sent >= MAX_HAVES {
                break;
            }
        }
    } else {
        // Stateless or no multi_ack: one shot of haves, then done.
        let mut writer = PktWriter::new(transport.writer());
        for have in haves.iter().take(MAX_HAVES) {
            writer.write_text(&format!("have {}", have.to_hex()))?;
        }
    }
    {
        let mut writer = PktWriter::new(transport.writer());
        writer.write_text("done")?;
        writer.flush()?;
    }
    transport.finish_request()?;

    // Final ACK/NAK, then the pack stream.
    let pack = {
        let mut reader = PktReader::new(transport.reader());
        loop {
            cancel.check()?;
            match reader.read_pkt()? {
                Pkt::Data(line) => {
                    let text = trim_newline(&line);
                    if text == b"NAK" {
                        break;
                    }
                    if let Some(rest) = strip_prefix(text, b"ACK ") {
                        // "ACK <id> <status>" continues; a bare
                        // "ACK <id>" is final.
                        if !rest.contains(&b' ') {
                            break;
                        }
                        continue;
                    }
                    if strip_prefix(text, b"shallow ").is_some()
                        || strip_prefix(text, b"unshallow ").is_some()
                    {
                        continue;
                    }
                    return Err(ProtocolError::NegotiationFailed(format!(
                        "unexpected negotiation line: {:?}",
                        text.as_bstr()
                    )));
                }
                Pkt::Flush => continue,
                _ => {
                    return Err(ProtocolError::NegotiationFailed(
                        "unexpected packet before pack stream".into(),
                    ))
                }
            }
        }

        receive_pack_stream(reader, odb, sideband, cancel, progress)?
    };

    let updated = apply_updates(odb, refs, &planned_updates)?;

    Ok(FetchOutcome::Fetched(FetchSummary {
        pack: Some(pack),
        updated_refs: updated,
        new_shallow,
        unshallowed,
    }))
}

fn trim_newline(line: &[u8]) -> &[u8] {
    match line.last() {
        Some(b'\n') => &line[..line.len() - 1],
        _ => line,
    }
}

fn strip_prefix<'a>(line: &'a [u8], prefix: &[u8]) -> Option<&'a [u8]> {
    line.strip_prefix(prefix)
}

fn parse_id(hex: &[u8]) -> Result<ObjectId, ProtocolError> {
    let hex = std::str::from_utf8(hex)
        .map_err(|_| ProtocolError::NegotiationFailed("non-UTF8 object id".into()))?;
    ObjectId::from_hex(hex.trim())
        .map_err(|e| ProtocolError::NegotiationFailed(format!("bad object id: {e}")))
}

fn require_shallow_caps(
    server: &crate::capability::Capabilities,
    options: &FetchOptions,
    shallow: &ShallowSet,
) -> Result<(), ProtocolError> {
    if (options.depth.is_some() || !shallow.is_empty()) && !server.has("shallow") {
        return Err(ProtocolError::UnknownCapability("shallow".into()));
    }
    if options.deepen_since.is_some() && !server.has("deepen-since") {
        return Err(ProtocolError::UnknownCapability("deepen-since".into()));
    }
    if !options.deepen_not.is_empty() && !server.has("deepen-not") {
        return Err(ProtocolError::UnknownCapability("deepen-not".into()));
    }
    Ok(())
}

/// Local commit tips in descending committer-time order.
fn local_haves(odb: &Odb, refs: &dyn RefStore) -> Result<Vec<ObjectId>, ProtocolError> {
    let mut seen = HashSet::new();
    let mut dated: Vec<(i64, ObjectId)> = Vec::new();

    for reference in refs.iter()? {
        let Some(id) = reference.target_id() else {
            continue;
        };
        if !seen.insert(id) {
            continue;
        }
        let Ok(encoded) = odb.get(Some(ObjectKind::Commit), &id) else {
            continue;
        };
        let Ok(commit) = Commit::parse(&encoded.data) else {
            continue;
        };
        dated.push((commit.commit_time(), id));
    }

    dated.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
    Ok(dated.into_iter().map(|(_, id)| id).collect())
}

/// Consume the pack bytes into the store's verifying sink.
fn receive_pack_stream<R: std::io::Read>(
    mut reader: PktReader<R>,
    odb: &Odb,
    sideband: SidebandMode,
    cancel: &CancelToken,
    progress: Option<&mut dyn FnMut(&[u8])>,
) -> Result<InstalledPack, ProtocolError> {
    let mut sink = odb.packfile_writer()?;

    match sideband {
        SidebandMode::None => {
            std::io::copy(reader.get_mut(), &mut sink)?;
        }
        SidebandMode::Band | SidebandMode::Band64k => {
            let mut demux = SidebandReader::new(reader);
            if let Some(progress) = progress {
                demux = demux.with_progress(progress);
            }
            loop {
                cancel.check()?;
                match demux.read_data()? {
                    Some(chunk) => sink.write_all(&chunk)?,
                    None => break,
                }
            }
        }
    }

    Ok(sink.commit(cancel)?)
}

/// Advance local refs for the fetched remote state.
fn apply_updates(
    odb: &Odb,
    refs: &dyn RefStore,
    planned: &[(RefSpec, RefName, ObjectId)],
) -> Result<Vec<RefUpdate>, ProtocolError> {
    let mut updated = Vec::new();
    for (spec, name, new) in planned {
        let current = refs.get(name)?;
        let old = current.as_ref().and_then(|r| r.target_id());
        if old == Some(*new) {
            continue;
        }

        // Non-forced updates must be fast-forwards.
        if let Some(old_id) = old {
            if !spec.is_force() && !is_ancestor(odb, &old_id, new)? {
                continue;
            }
        }

        let reference = Reference::hash(name.clone(), *new);
        refs.compare_and_set(&reference, current.as_ref())?;
        updated.push(RefUpdate {
            name: name.clone(),
            old,
            new: *new,
        });
    }
    Ok(updated)
}

/// Is `ancestor` reachable from `descendant`?
pub(crate) fn is_ancestor(
    odb: &Odb,
    ancestor: &ObjectId,
    descendant: &ObjectId,
) -> Result<bool, ProtocolError> {
    if ancestor == descendant {
        return Ok(true);
    }
    let mut queue = vec![*descendant];
    let mut seen: HashSet<ObjectId> = queue.iter().copied().collect();

    while let Some(id) = queue.pop() {
        let Ok(encoded) = odb.get(Some(ObjectKind::Commit), &id) else {
            continue;
        };
        let Ok(commit) = Commit::parse(&encoded.data) else {
            continue;
        };
        for parent in &commit.parents {
            if parent == ancestor {
                return Ok(true);
            }
            if seen.insert(*parent) {
                queue.push(*parent);
            }
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use grit_hash::HashFormat;
    use grit_ref::FilesRefStore;

    fn odb() -> (tempfile::TempDir, Odb) {
        let dir = tempfile::tempdir().unwrap();
        let odb = Odb::open(dir.path(), HashFormat::Sha1).unwrap();
        (dir, odb)
    }

    fn commit_into(odb: &Odb, parents: &[ObjectId], time: i64) -> ObjectId {
        use bstr::BString;
        use grit_object::{Object, Tree};
        use grit_utils::{Identity, When};
        let tree = odb
            .put_raw(ObjectKind::Tree, &Tree::new().serialize_content())
            .unwrap();
        let who = Identity::new("F", "f@example.com", When::new(time, 0));
        let commit = grit_object::Commit {
            tree,
            parents: parents.to_vec(),
            author: who.clone(),
            committer: who,
            encoding: None,
            extra_headers: Vec::new(),
            signature: None,
            message: BString::from("m\n"),
        };
        odb.put(&Object::Commit(commit).encode()).unwrap()
    }

    #[test]
    fn ancestry_check() {
        let (_dir, odb) = odb();
        let a = commit_into(&odb, &[], 1);
        let b = commit_into(&odb, &[a], 2);
        let c = commit_into(&odb, &[b], 3);
        let lone = commit_into(&odb, &[], 4);

        assert!(is_ancestor(&odb, &a, &c).unwrap());
        assert!(is_ancestor(&odb, &c, &c).unwrap());
        assert!(!is_ancestor(&odb, &c, &a).unwrap());
        assert!(!is_ancestor(&odb, &lone, &c).unwrap());
    }

    #[test]
    fn haves_are_newest_first() {
        let (_dir, odb) = odb();
        let ref_dir = tempfile::tempdir().unwrap();
        let store = FilesRefStore::new(ref_dir.path());

        let old = commit_into(&odb, &[], 100);
        let new = commit_into(&odb, &[old], 200);
        store
            .set(&Reference::hash(RefName::new("refs/heads/old").unwrap(), old))
            .unwrap();
        store
            .set(&Reference::hash(RefName::new("refs/heads/new").unwrap(), new))
            .unwrap();

        let haves = local_haves(&odb, &store).unwrap();
        assert_eq!(haves, vec![new, old]);
    }

    #[test]
    fn non_fast_forward_update_is_skipped_without_force() {
        let (_dir, odb) = odb();
        let ref_dir = tempfile::tempdir().unwrap();
        let store = FilesRefStore::new(ref_dir.path());

        let a = commit_into(&odb, &[], 1);
        let b = commit_into(&odb, &[a], 2);
        let rewritten = commit_into(&odb, &[], 3);

        let name = RefName::new("refs/remotes/origin/main").unwrap();
        store.set(&Reference::hash(name.clone(), b)).unwrap();

        // Plain refspec: rewind to an unrelated commit is refused.
        let spec = RefSpec::parse("refs/heads/main:refs/remotes/origin/main").unwrap();
        let updated =
            apply_updates(&odb, &store, &[(spec, name.clone(), rewritten)]).unwrap();
        assert!(updated.is_empty());
        assert_eq!(store.get(&name).unwrap().unwrap().target_id(), Some(b));

        // Forced refspec wins.
        let spec = RefSpec::parse("+refs/heads/main:refs/remotes/origin/main").unwrap();
        let updated =
            apply_updates(&odb, &store, &[(spec, name.clone(), rewritten)]).unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(
            store.get(&name).unwrap().unwrap().target_id(),
            Some(rewritten)
        );
    }

    #[test]
    fn fast_forward_update_applies() {
        let (_dir, odb) = odb();
        let ref_dir = tempfile::tempdir().unwrap();
        let store = FilesRefStore::new(ref_dir.path());

        let a = commit_into(&odb, &[], 1);
        let b = commit_into(&odb, &[a], 2);
        let name = RefName::new("refs/remotes/origin/main").unwrap();
        store.set(&Reference::hash(name.clone(), a)).unwrap();

        let spec = RefSpec::parse("refs/heads/main:refs/remotes/origin/main").unwrap();
        let updated = apply_updates(&odb, &store, &[(spec, name.clone(), b)]).unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].old, Some(a));
        assert_eq!(updated[0].new, b);
    }
}
