use std::collections::HashSet;

use strsim::levenshtein;

use crate::layers::{parser, IssueMetadata, Query};

const ISSUE_NUMBER_WORST: u32 = 10_000;
const TITLE_SUBSTRING: u32 = 100;
const TITLE_OVERLAP_BASE: u32 = 200;
const TITLE_DISJOINT_BASE: u32 = 300;
const TITLE_WORST: u32 = 400;

/// Everything about the query the ranking needs, computed once per identify
/// call.
pub struct QueryContext {
    pub exact_id: Option<u64>,
    pub issue_number: Option<String>,
    pub title_tokens: Vec<String>,
    pub authors: Vec<String>,
}

impl QueryContext {
    pub fn new(query: &Query) -> Self {
        let (issue_number, title_tokens) =
            parser::normalize(query.title.as_deref(), parser::title_tokens);
        Self {
            exact_id: query.issue_id(),
            issue_number,
            title_tokens,
            authors: query.authors.clone(),
        }
    }
}

/// Comparison key for sorting candidates, best match first.
///
/// Field order is significance order; the derived lexicographic Ord does the
/// rest. The trailing issue id makes the order total and repeatable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RankKey {
    id_mismatch: u8,
    issue_number_distance: u32,
    title_distance: u32,
    author_misses: u32,
    missing_pubdate: u8,
    issue_id: u64,
}

pub fn rank_key(context: &QueryContext, candidate: &IssueMetadata) -> RankKey {
    let id_mismatch = match context.exact_id {
        Some(id) if id == candidate.comicvine_id => 0,
        _ => 1,
    };

    RankKey {
        id_mismatch,
        issue_number_distance: issue_number_distance(
            context.issue_number.as_deref(),
            candidate.issue_number.as_deref(),
        ),
        title_distance: title_distance(&context.title_tokens, &candidate.title),
        author_misses: author_misses(&context.authors, &candidate.authors),
        missing_pubdate: candidate.pubdate.is_none() as u8,
        issue_id: candidate.comicvine_id,
    }
}

fn issue_number_distance(query: Option<&str>, candidate: Option<&str>) -> u32 {
    let Some(query) = query else {
        return 0;
    };
    let Some(candidate) = candidate else {
        return ISSUE_NUMBER_WORST;
    };
    if query == candidate {
        return 0;
    }
    match (query.parse::<f64>(), candidate.parse::<f64>()) {
        (Ok(q), Ok(c)) if (q - c).abs() < f64::EPSILON => 0,
        (Ok(q), Ok(c)) => (((q - c).abs() * 100.0).round() as u32).clamp(1, ISSUE_NUMBER_WORST),
        _ => ISSUE_NUMBER_WORST,
    }
}

fn title_distance(query_tokens: &[String], candidate_title: &str) -> u32 {
    if query_tokens.is_empty() {
        return 0;
    }
    let candidate_tokens = parser::title_tokens(candidate_title);
    if candidate_tokens.is_empty() {
        return TITLE_WORST;
    }

    let query_joined = query_tokens.join(" ");
    let candidate_joined = candidate_tokens.join(" ");
    if query_joined == candidate_joined {
        return 0;
    }
    if candidate_joined.contains(&query_joined) || query_joined.contains(&candidate_joined) {
        return TITLE_SUBSTRING;
    }

    let query_set: HashSet<&String> = query_tokens.iter().collect();
    let candidate_set: HashSet<&String> = candidate_tokens.iter().collect();
    let overlap = query_set.intersection(&candidate_set).count();
    if overlap > 0 {
        let ratio = overlap as f64 / query_set.len().max(candidate_set.len()) as f64;
        TITLE_OVERLAP_BASE + ((1.0 - ratio) * 100.0).round() as u32
    } else {
        TITLE_DISJOINT_BASE + (levenshtein(&query_joined, &candidate_joined) as u32).min(100)
    }
}

fn author_misses(query_authors: &[String], candidate_authors: &[String]) -> u32 {
    if query_authors.is_empty() {
        return 0;
    }
    query_authors
        .iter()
        .filter(|author| {
            !candidate_authors
                .iter()
                .any(|candidate| candidate.eq_ignore_ascii_case(author))
        })
        .count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::HashMap;

    fn candidate(issue_id: u64, title: &str) -> IssueMetadata {
        IssueMetadata {
            comicvine_id: issue_id,
            comicvine_volume_id: None,
            title: title.to_string(),
            issue_number: Some("1".to_string()),
            authors: vec!["Jim Shooter".to_string()],
            publisher: None,
            pubdate: NaiveDate::from_ymd_opt(2010, 6, 9),
            comments: None,
            cover_urls: Vec::new(),
        }
    }

    fn context_for(title: &str) -> QueryContext {
        QueryContext::new(&Query {
            title: Some(title.to_string()),
            ..Query::default()
        })
    }

    #[test]
    fn test_exact_identifier_beats_everything_else() {
        let context = QueryContext::new(&Query {
            title: Some("Magnus, Robot Fighter 01 (2010)".to_string()),
            authors: vec!["Jim Shooter".to_string()],
            identifiers: HashMap::from([("comicvine".to_string(), 99u64)]),
        });

        let mut by_id = candidate(99, "Something Else Entirely");
        by_id.issue_number = Some("7".to_string());
        by_id.authors = Vec::new();
        by_id.pubdate = None;
        let by_everything = candidate(1, "Magnus, Robot Fighter #1");

        assert!(rank_key(&context, &by_id) < rank_key(&context, &by_everything));
    }

    #[test]
    fn test_issue_number_distance_is_proportional() {
        assert_eq!(issue_number_distance(Some("1"), Some("1")), 0);
        assert_eq!(issue_number_distance(Some("1"), Some("1.0")), 0);
        assert!(
            issue_number_distance(Some("1"), Some("2"))
                < issue_number_distance(Some("1"), Some("5"))
        );
        assert_eq!(issue_number_distance(Some("1"), None), ISSUE_NUMBER_WORST);
        assert_eq!(
            issue_number_distance(Some("1"), Some("annual")),
            ISSUE_NUMBER_WORST
        );
        assert_eq!(issue_number_distance(None, Some("12")), 0);
    }

    #[test]
    fn test_title_tiers_order() {
        let query = parser::title_tokens("Magnus Robot Fighter");
        let exact = title_distance(&query, "Magnus Robot Fighter");
        let substring = title_distance(&query, "Magnus Robot Fighter #1");
        let overlap = title_distance(&query, "Magnus the Living Robot");
        let disjoint = title_distance(&query, "Superdog in Space");

        assert_eq!(exact, 0);
        assert!(exact < substring);
        assert!(substring < overlap);
        assert!(overlap < disjoint);
    }

    #[test]
    fn test_author_overlap_neutral_without_query_authors() {
        assert_eq!(author_misses(&[], &["Jim Shooter".to_string()]), 0);
        let query = vec!["Jim Shooter".to_string(), "Bill Reinhold".to_string()];
        assert_eq!(author_misses(&query, &["jim shooter".to_string()]), 1);
        assert_eq!(author_misses(&query, &[]), 2);
    }

    #[test]
    fn test_known_pubdate_sorts_first() {
        let context = context_for("Magnus, Robot Fighter 01 (2010)");
        let dated = candidate(5, "Magnus, Robot Fighter #1");
        let mut undated = candidate(4, "Magnus, Robot Fighter #1");
        undated.pubdate = None;

        assert!(rank_key(&context, &dated) < rank_key(&context, &undated));
    }

    #[test]
    fn test_ties_break_on_issue_id() {
        let context = context_for("Magnus, Robot Fighter 01 (2010)");
        let first = candidate(4, "Magnus, Robot Fighter #1");
        let second = candidate(5, "Magnus, Robot Fighter #1");

        assert!(rank_key(&context, &first) < rank_key(&context, &second));
        // identical inputs produce identical keys
        assert_eq!(rank_key(&context, &first), rank_key(&context, &first));
    }

    #[test]
    fn test_sorting_is_deterministic() {
        let context = context_for("Magnus, Robot Fighter 01 (2010)");
        let mut candidates = vec![
            candidate(3, "Superdog in Space"),
            candidate(1, "Magnus, Robot Fighter #1"),
            candidate(2, "Magnus Robot"),
        ];
        candidates.sort_by_key(|c| rank_key(&context, c));
        let first_pass: Vec<u64> = candidates.iter().map(|c| c.comicvine_id).collect();

        candidates.reverse();
        candidates.sort_by_key(|c| rank_key(&context, c));
        let second_pass: Vec<u64> = candidates.iter().map(|c| c.comicvine_id).collect();

        assert_eq!(first_pass, second_pass);
        assert_eq!(first_pass[0], 1);
    }
}
