use indexmap::IndexSet;

use super::vocabulary::{is_backdrop, preset_position, PRESET_CLAUSES};

pub const CLAUSE_SEPARATOR: &str = ", ";

/// Selects clauses to drop during an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClauseFilter {
    Exact(String),
    Backdrop,
}

impl ClauseFilter {
    pub fn exact(clause: impl Into<String>) -> Self {
        ClauseFilter::Exact(clause.into())
    }

    pub fn matches(&self, clause: &str) -> bool {
        match self {
            ClauseFilter::Exact(value) => value == clause,
            ClauseFilter::Backdrop => is_backdrop(clause),
        }
    }
}

/// Splits a prompt into its ordered, trimmed, de-duplicated clauses.
pub fn parse_clauses(prompt: &str) -> IndexSet<String> {
    prompt
        .split(CLAUSE_SEPARATOR)
        .map(str::trim)
        .filter(|clause| !clause.is_empty())
        .map(str::to_string)
        .collect()
}

/// Presets first in vocabulary order, everything else after in its current
/// relative order.
pub fn join_canonical(clauses: &IndexSet<String>) -> String {
    let presets = PRESET_CLAUSES
        .iter()
        .filter(|preset| clauses.contains(**preset))
        .map(|preset| preset.to_string());
    let rest = clauses
        .iter()
        .filter(|clause| preset_position(clause).is_none())
        .cloned();
    presets
        .chain(rest)
        .collect::<IndexSet<String>>()
        .into_iter()
        .collect::<Vec<String>>()
        .join(CLAUSE_SEPARATOR)
}

pub fn canonicalize(prompt: &str) -> String {
    join_canonical(&parse_clauses(prompt))
}

pub fn apply_update<S: AsRef<str>>(prompt: &str, add: &[S], remove: &[ClauseFilter]) -> String {
    let mut clauses = parse_clauses(prompt);
    clauses.retain(|clause| !remove.iter().any(|filter| filter.matches(clause)));
    for entry in add {
        for clause in parse_clauses(entry.as_ref()) {
            clauses.insert(clause);
        }
    }
    join_canonical(&clauses)
}

#[cfg(test)]
mod tests {
    use indexmap::IndexSet;

    use super::{apply_update, canonicalize, parse_clauses, ClauseFilter};
    use crate::prompt::vocabulary::PRESET_CLAUSES;

    const NONE: &[&str] = &[];

    #[test]
    fn parse_trims_drops_empty_and_dedupes() {
        let clauses = parse_clauses("  foo , , bar, foo,  ");
        assert_eq!(
            clauses.into_iter().collect::<Vec<String>>(),
            vec!["foo".to_string(), "bar".to_string()]
        );
        assert!(parse_clauses("").is_empty());
    }

    #[test]
    fn add_then_remove_example() {
        let prompt = apply_update("", &["increase contrast"], &[]);
        let prompt = apply_update(&prompt, &["restore color"], &[]);
        assert_eq!(prompt, "restore color, increase contrast");
        let prompt = apply_update(&prompt, NONE, &[ClauseFilter::exact("increase contrast")]);
        assert_eq!(prompt, "restore color");
    }

    #[test]
    fn adding_existing_clause_does_not_duplicate() {
        let prompt = apply_update("keep faces sharp, restore color", &["restore color"], &[]);
        assert_eq!(prompt, "restore color, keep faces sharp");
        let again = apply_update(&prompt, &["keep faces sharp"], &[]);
        assert_eq!(again, prompt);
    }

    #[test]
    fn presets_lead_in_vocabulary_order() {
        let prompt = apply_update(
            "warm tones",
            &["reduce noise", "make it vivid", "remove scratches and dust"],
            &[],
        );
        assert_eq!(
            prompt,
            "remove scratches and dust, reduce noise, warm tones, make it vivid"
        );
    }

    #[test]
    fn backdrop_filter_removes_any_backdrop_clause() {
        let prompt = apply_update(
            "foo, with a gradient red backdrop, bar",
            NONE,
            &[ClauseFilter::Backdrop],
        );
        assert_eq!(prompt, "foo, bar");
    }

    #[test]
    fn added_entries_are_split_so_output_reparses_identically() {
        let prompt = apply_update("", &["alpha, beta", "  "], &[]);
        assert_eq!(prompt, "alpha, beta");
        assert_eq!(parse_clauses(&prompt).len(), 2);
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let samples = [
            "",
            "restore color,  foo ,foo, increase contrast",
            "a,b, c,, d, reduce noise, a",
            "with a plain #cccccc backdrop, sharpen details, sharpen details",
            " , , ",
        ];
        for sample in samples {
            let once = canonicalize(sample);
            assert_eq!(canonicalize(&once), once, "sample: {sample:?}");
        }
    }

    #[test]
    fn update_sequence_matches_set_algebra() {
        let pool = [
            PRESET_CLAUSES[4],
            PRESET_CLAUSES[0],
            "soften skin",
            PRESET_CLAUSES[6],
            "with a plain #000000 backdrop",
            PRESET_CLAUSES[2],
            "keep the hat",
        ];
        let mut expected: IndexSet<String> = IndexSet::new();
        let mut prompt = String::new();
        let mut seed: u64 = 0x9e37_79b9;
        for _ in 0..200 {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let clause = pool[(seed >> 33) as usize % pool.len()];
            if (seed >> 20) & 1 == 0 {
                prompt = apply_update(&prompt, &[clause], &[]);
                expected.insert(clause.to_string());
            } else {
                prompt = apply_update(&prompt, NONE, &[ClauseFilter::exact(clause)]);
                expected.shift_remove(clause);
            }

            let actual = parse_clauses(&prompt);
            let mut actual_sorted = actual.iter().cloned().collect::<Vec<String>>();
            let mut expected_sorted = expected.iter().cloned().collect::<Vec<String>>();
            actual_sorted.sort();
            expected_sorted.sort();
            assert_eq!(actual_sorted, expected_sorted);

            let preset_positions = actual
                .iter()
                .filter_map(|clause| PRESET_CLAUSES.iter().position(|preset| preset == clause))
                .collect::<Vec<usize>>();
            let mut sorted_positions = preset_positions.clone();
            sorted_positions.sort();
            assert_eq!(preset_positions, sorted_positions);
            let leading = actual
                .iter()
                .take(preset_positions.len())
                .filter(|clause| PRESET_CLAUSES.contains(&clause.as_str()))
                .count();
            assert_eq!(leading, preset_positions.len());
        }
    }
}
