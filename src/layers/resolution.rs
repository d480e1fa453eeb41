use std::collections::HashSet;

use crate::layers::catalog::{CatalogClient, CatalogError};

/// Build the candidate issue-id set for a query.
///
/// Volume candidates come from the title tokens (or the volume hint when the
/// caller already knows the volume), issues are filtered by issue number
/// within each volume, and the author lookup intersects the result when it
/// yields any constraint at all.
pub async fn resolve<C: CatalogClient>(
    catalog: &C,
    tokens: &[String],
    issue_number: Option<&str>,
    volume_hint: Option<u64>,
    authors: &[String],
) -> Result<HashSet<u64>, CatalogError> {
    let volume_ids = match volume_hint {
        Some(volume_id) => vec![volume_id],
        None => catalog.search_volumes(tokens).await?,
    };

    let mut issue_ids = HashSet::new();
    for volume_id in volume_ids {
        let issues = catalog
            .list_issues(volume_id, issue_number.map(String::from))
            .await?;
        tracing::debug!("Volume({}) contributed {} issues", volume_id, issues.len());
        issue_ids.extend(issues);
    }

    if !authors.is_empty() {
        match catalog.search_issues_by_author(authors).await? {
            Some(author_issue_ids) => {
                issue_ids.retain(|id| author_issue_ids.contains(id));
            }
            // No person matched; an unresolvable author must not empty the set.
            None => tracing::debug!("author lookup gave no constraint, skipping filter"),
        }
    }

    Ok(issue_ids)
}
