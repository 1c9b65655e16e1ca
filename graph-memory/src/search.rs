//! Ranked entity search
//!
//! Both backends funnel their candidates through [`rank`], so ordering and
//! snippet extraction are identical no matter how the candidates were found.
//!
//! A query is split on whitespace and treated as an OR of words. Each matched
//! entity is classified into the best [`MatchTier`] any word reaches, then
//! sorted by tier (best first) and name.

use crate::model::{Entity, EntitySearchHit, SearchResult};

/// Snippets per hit when a positive limit is set
pub const MAX_SNIPPETS: usize = 2;

/// Characters of context kept on each side of a match
const SNIPPET_CONTEXT: usize = 50;

/// Length cap for fallback snippets taken from the first observations
const FALLBACK_SNIPPET_LEN: usize = 100;

const ELLIPSIS: &str = "...";

/// Which field a query word matched, lowest priority first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchTier {
    /// Word found in an observation
    Content,
    /// Word found in the entity type
    Type,
    /// Word is a substring of the name
    NamePartial,
    /// Word equals the name
    NameExact,
}

/// Case-folded query words
#[derive(Debug, Clone, Default)]
pub struct QueryTerms {
    raw: Vec<String>,
    folded: Vec<Vec<char>>,
}

impl QueryTerms {
    pub fn parse(query: &str) -> Self {
        let raw: Vec<String> = query.split_whitespace().map(str::to_string).collect();
        let folded = raw.iter().map(|w| fold(w)).collect();
        Self { raw, folded }
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Words as typed
    pub fn words(&self) -> &[String] {
        &self.raw
    }
}

/// An entity that may match, with its relation count
#[derive(Debug, Clone)]
pub struct Candidate {
    pub entity: Entity,
    pub relations_count: usize,
}

impl Candidate {
    pub fn new(entity: Entity, relations_count: usize) -> Self {
        Self {
            entity,
            relations_count,
        }
    }
}

/// Lowercase char by char, keeping a 1:1 mapping to the original chars.
fn fold(text: &str) -> Vec<char> {
    text.chars()
        .map(|c| c.to_lowercase().next().unwrap_or(c))
        .collect()
}

fn find(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Best tier any query word reaches for this entity.
pub fn classify(entity: &Entity, terms: &QueryTerms) -> Option<MatchTier> {
    let name = fold(&entity.name);
    let entity_type = fold(&entity.entity_type);
    let mut observations: Option<Vec<Vec<char>>> = None;
    let mut best: Option<MatchTier> = None;

    for word in &terms.folded {
        let tier = if name == *word {
            Some(MatchTier::NameExact)
        } else if find(&name, word).is_some() {
            Some(MatchTier::NamePartial)
        } else if find(&entity_type, word).is_some() {
            Some(MatchTier::Type)
        } else {
            let folded_obs = observations
                .get_or_insert_with(|| entity.observations.iter().map(|o| fold(o)).collect());
            folded_obs
                .iter()
                .any(|obs| find(obs, word).is_some())
                .then_some(MatchTier::Content)
        };

        if tier > best {
            best = tier;
        }
        if best == Some(MatchTier::NameExact) {
            break;
        }
    }

    best
}

/// Earliest occurrence of any word: `(char offset, word length)`.
fn first_occurrence(text: &[char], terms: &QueryTerms) -> Option<(usize, usize)> {
    terms
        .folded
        .iter()
        .filter_map(|word| find(text, word).map(|pos| (pos, word.len())))
        .min_by_key(|(pos, _)| *pos)
}

fn window(chars: &[char], start: usize, end: usize) -> String {
    let mut snippet = String::new();
    if start > 0 {
        snippet.push_str(ELLIPSIS);
    }
    snippet.extend(&chars[start..end]);
    if end < chars.len() {
        snippet.push_str(ELLIPSIS);
    }
    snippet
}

/// Context window around the first query word in `observation`.
pub fn snippet_for(observation: &str, terms: &QueryTerms) -> Option<String> {
    let (pos, len) = first_occurrence(&fold(observation), terms)?;
    let chars: Vec<char> = observation.chars().collect();
    let start = pos.saturating_sub(SNIPPET_CONTEXT);
    let end = (pos + len + SNIPPET_CONTEXT).min(chars.len());
    Some(window(&chars, start, end))
}

fn truncate_chars(text: &str, max: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max {
        return text.to_string();
    }
    window(&chars, 0, max)
}

/// Snippets for one hit; `max == None` means unbounded.
///
/// Falls back to the first observations when no observation contains a
/// query word (e.g. a pure name match).
pub fn extract_snippets(
    observations: &[String],
    terms: &QueryTerms,
    max: Option<usize>,
) -> Vec<String> {
    let cap = max.unwrap_or(usize::MAX);
    let matched: Vec<String> = observations
        .iter()
        .filter_map(|obs| snippet_for(obs, terms))
        .take(cap)
        .collect();

    if !matched.is_empty() {
        return matched;
    }

    observations
        .iter()
        .take(cap.min(MAX_SNIPPETS))
        .map(|obs| truncate_chars(obs, FALLBACK_SNIPPET_LEN))
        .collect()
}

/// Classify, order and page candidates.
///
/// `unmatched_tier` admits candidates no word matches by substring; the
/// index-backed path uses it for stemmed hits the scan would not see.
pub fn rank<I>(
    terms: &QueryTerms,
    candidates: I,
    limit: usize,
    unmatched_tier: Option<MatchTier>,
) -> SearchResult
where
    I: IntoIterator<Item = Candidate>,
{
    if terms.is_empty() {
        return SearchResult::empty(limit);
    }

    let mut scored: Vec<(MatchTier, Candidate)> = candidates
        .into_iter()
        .filter_map(|c| {
            classify(&c.entity, terms)
                .or(unmatched_tier)
                .map(|tier| (tier, c))
        })
        .collect();

    scored.sort_by(|(ta, a), (tb, b)| tb.cmp(ta).then_with(|| a.entity.name.cmp(&b.entity.name)));

    let total = scored.len();
    let has_more = limit > 0 && total > limit;
    if limit > 0 {
        scored.truncate(limit);
    }

    let max_snippets = (limit > 0).then_some(MAX_SNIPPETS);
    let entities = scored
        .into_iter()
        .map(|(_, c)| EntitySearchHit {
            snippets: extract_snippets(&c.entity.observations, terms, max_snippets),
            observations_count: c.entity.observations.len(),
            relations_count: c.relations_count,
            name: c.entity.name,
            entity_type: c.entity.entity_type,
        })
        .collect();

    SearchResult {
        entities,
        total,
        limit,
        has_more,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, entity_type: &str, observations: &[&str]) -> Candidate {
        Candidate::new(
            Entity::new(name, entity_type).with_observations(observations.iter().copied()),
            0,
        )
    }

    #[test]
    fn test_query_terms_split_on_whitespace() {
        let terms = QueryTerms::parse("  rust   async\tcode ");
        assert_eq!(terms.words(), &["rust", "async", "code"]);
        assert!(QueryTerms::parse("   ").is_empty());
    }

    #[test]
    fn test_classify_tiers() {
        let terms = QueryTerms::parse("go");
        let exact = Entity::new("Go", "language");
        let partial = Entity::new("Golang", "language");
        let typed = Entity::new("Gopher", "mascot");
        let by_type = Entity::new("Rust", "gopher-free");
        let content = Entity::new("Rust", "language").with_observation("Not Go at all");
        let none = Entity::new("Rust", "language");

        assert_eq!(classify(&exact, &terms), Some(MatchTier::NameExact));
        assert_eq!(classify(&partial, &terms), Some(MatchTier::NamePartial));
        assert_eq!(classify(&typed, &terms), Some(MatchTier::NamePartial));
        assert_eq!(classify(&by_type, &terms), Some(MatchTier::Type));
        assert_eq!(classify(&content, &terms), Some(MatchTier::Content));
        assert_eq!(classify(&none, &terms), None);
    }

    #[test]
    fn test_classify_takes_best_word() {
        let terms = QueryTerms::parse("editor vim");
        let entity = Entity::new("Vim", "editor");
        assert_eq!(classify(&entity, &terms), Some(MatchTier::NameExact));
    }

    #[test]
    fn test_rank_name_before_content() {
        let terms = QueryTerms::parse("Claude");
        let result = rank(
            &terms,
            vec![
                candidate("VSCode", "editor", &["Supports Claude plugin for AI assistance"]),
                candidate("Vim", "editor", &["A classic text editor"]),
                candidate("Claude Code", "tool", &["A CLI tool for coding assistance"]),
            ],
            10,
            None,
        );

        assert_eq!(result.names(), vec!["Claude Code", "VSCode"]);
        assert_eq!(result.total, 2);
        assert!(!result.has_more);
    }

    #[test]
    fn test_rank_exact_before_partial_then_by_name() {
        let terms = QueryTerms::parse("Go");
        let result = rank(
            &terms,
            vec![
                candidate("GoLand", "IDE", &["JetBrains IDE for Go development"]),
                candidate("Go", "language", &["A programming language by Google"]),
                candidate("Golang", "language", &["Another name for Go language"]),
            ],
            10,
            None,
        );

        assert_eq!(result.names(), vec!["Go", "GoLand", "Golang"]);
    }

    #[test]
    fn test_rank_name_type_content_order() {
        let terms = QueryTerms::parse("tool");
        let result = rank(
            &terms,
            vec![
                candidate("Project", "software", &["This project uses various tool chains"]),
                candidate("VSCode", "tool", &["A code editor"]),
                candidate("MyTool", "application", &["A custom application"]),
            ],
            10,
            None,
        );

        assert_eq!(result.names(), vec!["MyTool", "VSCode", "Project"]);
    }

    #[test]
    fn test_rank_limit_and_has_more() {
        let terms = QueryTerms::parse("x");
        let candidates: Vec<_> = (0..5).map(|i| candidate(&format!("x{i}"), "t", &[])).collect();

        let limited = rank(&terms, candidates.clone(), 2, None);
        assert_eq!(limited.entities.len(), 2);
        assert_eq!(limited.total, 5);
        assert!(limited.has_more);

        let unlimited = rank(&terms, candidates, 0, None);
        assert_eq!(unlimited.entities.len(), 5);
        assert!(!unlimited.has_more);
    }

    #[test]
    fn test_rank_empty_query() {
        let result = rank(
            &QueryTerms::parse(""),
            vec![candidate("A", "t", &[])],
            10,
            None,
        );
        assert!(result.entities.is_empty());
        assert_eq!(result.total, 0);
    }

    #[test]
    fn test_unmatched_tier_admits_index_hits() {
        let terms = QueryTerms::parse("running");
        let c = candidate("Marathon", "event", &["People run far"]);

        assert!(rank(&terms, vec![c.clone()], 10, None).entities.is_empty());
        let admitted = rank(&terms, vec![c], 10, Some(MatchTier::Content));
        assert_eq!(admitted.names(), vec!["Marathon"]);
    }

    #[test]
    fn test_snippet_window_and_ellipsis() {
        let text = format!("{}needle{}", "a".repeat(80), "b".repeat(80));
        let snippet = snippet_for(&text, &QueryTerms::parse("NEEDLE")).unwrap();

        assert!(snippet.starts_with("..."));
        assert!(snippet.ends_with("..."));
        assert!(snippet.contains("needle"));
        assert_eq!(snippet.chars().count(), 3 + 50 + 6 + 50 + 3);
    }

    #[test]
    fn test_snippet_short_text_has_no_ellipsis() {
        let snippet = snippet_for("uses Claude daily", &QueryTerms::parse("claude")).unwrap();
        assert_eq!(snippet, "uses Claude daily");
    }

    #[test]
    fn test_snippet_multibyte_boundaries() {
        let text = format!("{}café{}", "é".repeat(70), "ü".repeat(70));
        let snippet = snippet_for(&text, &QueryTerms::parse("CAFÉ")).unwrap();
        assert!(snippet.contains("café"));
    }

    #[test]
    fn test_snippets_capped_at_two() {
        let observations: Vec<String> = (0..5).map(|i| format!("match {i}")).collect();
        let terms = QueryTerms::parse("match");

        assert_eq!(extract_snippets(&observations, &terms, Some(MAX_SNIPPETS)).len(), 2);
        assert_eq!(extract_snippets(&observations, &terms, None).len(), 5);
    }

    #[test]
    fn test_snippets_fallback_to_first_observations() {
        let long = "z".repeat(150);
        let observations = vec![long, "second".to_string(), "third".to_string()];
        let snippets = extract_snippets(&observations, &QueryTerms::parse("absent"), Some(2));

        assert_eq!(snippets.len(), 2);
        assert_eq!(snippets[0].chars().count(), 100 + 3);
        assert!(snippets[0].ends_with("..."));
        assert_eq!(snippets[1], "second");
    }

    #[test]
    fn test_hit_carries_counts() {
        let terms = QueryTerms::parse("alice");
        let mut c = candidate("Alice", "person", &["one", "two", "three"]);
        c.relations_count = 4;

        let result = rank(&terms, vec![c], 10, None);
        let hit = &result.entities[0];
        assert_eq!(hit.observations_count, 3);
        assert_eq!(hit.relations_count, 4);
        assert_eq!(hit.snippets, vec!["one", "two"]);
    }
}
