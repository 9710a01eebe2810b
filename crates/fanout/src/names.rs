// SPDX-License-Identifier: MIT

//! Alliterative folder-name generator (spec.md §4.A "Name generator").
//!
//! Grounded on the teacher's `generate_session_name`/`generate_short_random`
//! (`adapters/src/agent/claude.rs`): a small wordlist, `rand::rng()` for
//! selection, and a bounded retry loop on collision rather than an
//! unbounded one.

use gueridon_core::FolderName;
use rand::Rng;
use std::collections::HashSet;

const MAX_ATTEMPTS: usize = 20;

/// Each entry pairs adjectives and nouns sharing a leading letter so every
/// generated name is alliterative by construction.
const WORDS: &[(&[&str], &[&str])] = &[
    (
        &["amber", "ancient", "arid", "avid"],
        &["anchor", "arbor", "atoll", "aspen"],
    ),
    (
        &["brisk", "bold", "broad", "brave"],
        &["basin", "bramble", "boulder", "beacon"],
    ),
    (
        &["calm", "crisp", "curious", "chipper"],
        &["canyon", "cove", "cedar", "current"],
    ),
    (
        &["dusty", "daring", "deep", "drifting"],
        &["delta", "dune", "docket", "drumlin"],
    ),
    (
        &["eager", "even", "edged", "early"],
        &["estuary", "eddy", "embers", "echo"],
    ),
    (
        &["fleet", "faint", "fond", "frosty"],
        &["fjord", "ferry", "foothill", "furrow"],
    ),
    (
        &["gentle", "gilded", "gruff", "glad"],
        &["glacier", "grove", "gully", "gantry"],
    ),
    (
        &["hushed", "hardy", "hollow", "humble"],
        &["harbor", "hollow", "hearth", "highland"],
    ),
    (
        &["idle", "inky", "iron", "intent"],
        &["inlet", "island", "isthmus", "ivy"],
    ),
    (
        &["jaunty", "jolly", "jagged", "just"],
        &["jetty", "junction", "jungle", "juniper"],
    ),
    (
        &["keen", "kindly", "knotty", "kindled"],
        &["kestrel", "kelp", "knoll", "keep"],
    ),
    (
        &["lively", "loyal", "low", "lucid"],
        &["lagoon", "ledge", "lantern", "loft"],
    ),
    (
        &["mellow", "mild", "muted", "modest"],
        &["marsh", "meadow", "mesa", "moraine"],
    ),
    (
        &["nimble", "noble", "nested", "northern"],
        &["nook", "notch", "needle", "nebula"],
    ),
    (
        &["open", "oaken", "orderly", "olden"],
        &["outpost", "oasis", "orchard", "overlook"],
    ),
    (
        &["patient", "placid", "plucky", "pale"],
        &["pasture", "plateau", "pier", "pinewood"],
    ),
    (
        &["quiet", "quick", "quaint", "quickened"],
        &["quarry", "quay", "quill", "quarter"],
    ),
    (
        &["ready", "restless", "rugged", "rustic"],
        &["ridge", "ravine", "reef", "rookery"],
    ),
    (
        &["steady", "spry", "sturdy", "stoic"],
        &["slope", "spring", "summit", "strand"],
    ),
    (
        &["tidy", "tranquil", "thrifty", "tall"],
        &["terrace", "thicket", "trailhead", "tarn"],
    ),
];

/// Generate a `{adjective}-{noun}` name not already present in `existing`.
///
/// Returns `None` after [`MAX_ATTEMPTS`] collisions, leaving the caller to
/// surface a failure rather than loop forever.
pub fn generate_folder_name(existing: &HashSet<FolderName>) -> Option<FolderName> {
    let mut rng = rand::rng();
    for _ in 0..MAX_ATTEMPTS {
        let (adjectives, nouns) = WORDS[rng.random_range(0..WORDS.len())];
        let adjective = adjectives[rng.random_range(0..adjectives.len())];
        let noun = nouns[rng.random_range(0..nouns.len())];
        let candidate = FolderName::new(format!("{adjective}-{noun}"));
        if !existing.contains(&candidate) {
            return Some(candidate);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_alliterative_hyphenated_name() {
        let existing = HashSet::new();
        let name = generate_folder_name(&existing).expect("should generate a name");
        let (adjective, noun) = name.as_str().split_once('-').expect("hyphenated");
        assert_eq!(
            adjective.chars().next(),
            noun.chars().next(),
            "expected alliteration in {name}"
        );
    }

    #[test]
    fn produces_human_memorable_variety() {
        let existing = HashSet::new();
        let mut seen = HashSet::new();
        for _ in 0..30 {
            if let Some(name) = generate_folder_name(&existing) {
                seen.insert(name.as_str().to_string());
            }
        }
        assert!(
            seen.len() >= 10,
            "expected at least 10 distinct names in 30 draws, got {}",
            seen.len()
        );
    }

    #[test]
    fn avoids_existing_names_until_exhausted() {
        // A single-word pool forces every attempt to collide.
        let mut existing = HashSet::new();
        for (adjectives, nouns) in WORDS {
            for adjective in *adjectives {
                for noun in *nouns {
                    existing.insert(FolderName::new(format!("{adjective}-{noun}")));
                }
            }
        }
        assert!(generate_folder_name(&existing).is_none());
    }
}
