use std::cmp::Ordering;
use std::collections::HashSet;

use crate::candidate::Candidate;
use crate::hash::{PerceptualHash, PixelHasher};

/// Maximum Hamming distance (of 64 bits) at which two images are one cluster.
pub const DEFAULT_HAMMING_THRESHOLD: u32 = 6;

struct Member {
    candidate: Candidate,
    hash: Option<PerceptualHash>,
    /// Input position, the last-resort tie-break.
    order: usize,
    /// Whether this member already stands for images at other URLs.
    absorbed_others: bool,
}

/// Collapses near-duplicates to one representative per cluster.
///
/// Candidates sharing a canonical URL collapse first, keeping the earliest.
/// The remainder is clustered greedily against each cluster seed; passes are
/// repeated over the representatives until nothing merges, so no two
/// survivors are within `threshold` of each other and a second call is a
/// no-op. Candidates without accessible pixels or a fingerprint are never
/// clustered, even when they carry a stale hash.
pub fn dedupe(
    candidates: Vec<Candidate>,
    threshold: u32,
    hasher: &dyn PixelHasher,
) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    let mut members: Vec<Member> = candidates
        .into_iter()
        .filter(|candidate| seen.insert(candidate.url.clone()))
        .enumerate()
        .map(|(order, candidate)| {
            let hash = if candidate.pixels.is_accessible() {
                candidate
                    .perceptual_hash
                    .or_else(|| hasher.fingerprint(&candidate.pixels))
            } else {
                None
            };
            let absorbed_others = candidate.uniqueness_score < 1.0;
            Member {
                candidate,
                hash,
                order,
                absorbed_others,
            }
        })
        .collect();

    loop {
        let (next, merged) = cluster_pass(members, threshold);
        members = next;
        if !merged {
            break;
        }
    }

    members
        .into_iter()
        .enumerate()
        .map(|(cluster_id, member)| {
            let mut candidate = member.candidate;
            if member.hash.is_some() {
                candidate.perceptual_hash = member.hash;
            }
            candidate.cluster_id = Some(cluster_id);
            candidate.uniqueness_score = if member.absorbed_others { 0.0 } else { 1.0 };
            candidate
        })
        .collect()
}

fn cluster_pass(members: Vec<Member>, threshold: u32) -> (Vec<Member>, bool) {
    let hashes: Vec<Option<PerceptualHash>> = members.iter().map(|m| m.hash).collect();
    let mut slots: Vec<Option<Member>> = members.into_iter().map(Some).collect();
    let mut taken = vec![false; slots.len()];
    let mut representatives = Vec::new();
    let mut merged_any = false;

    for seed_idx in 0..slots.len() {
        if taken[seed_idx] {
            continue;
        }
        taken[seed_idx] = true;
        let mut group = vec![seed_idx];

        if let Some(seed) = hashes[seed_idx] {
            for other in (seed_idx + 1)..slots.len() {
                if taken[other] {
                    continue;
                }
                if let Some(hash) = hashes[other] {
                    if hash.distance(seed) <= threshold {
                        taken[other] = true;
                        group.push(other);
                    }
                }
            }
        }

        if group.len() > 1 {
            merged_any = true;
        }
        let group_members: Vec<Member> = group.iter().filter_map(|&i| slots[i].take()).collect();
        if let Some(rep) = pick_representative(group_members) {
            representatives.push(rep);
        }
    }

    (representatives, merged_any)
}

fn pick_representative(group: Vec<Member>) -> Option<Member> {
    let absorbed_others = group.len() > 1 || group.iter().any(|m| m.absorbed_others);
    let mut rep = group.into_iter().min_by(rank)?;
    rep.absorbed_others = absorbed_others;
    Some(rep)
}

/// `Less` means `a` is the better representative.
fn rank(a: &Member, b: &Member) -> Ordering {
    let sharp = |m: &Member| m.candidate.sharpness.unwrap_or(f64::NEG_INFINITY);
    b.candidate
        .area()
        .cmp(&a.candidate.area())
        .then_with(|| sharp(b).total_cmp(&sharp(a)))
        .then_with(|| b.candidate.final_score.total_cmp(&a.candidate.final_score))
        .then_with(|| a.order.cmp(&b.order))
}
