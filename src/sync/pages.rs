use chrono::{Datelike, NaiveDate};
use futures::future::try_join_all;

use crate::api::client::SUGGESTION_LIMIT;
use crate::api::store::GraphStore;
use crate::api::types::{NodeId, TitleMatch, TitleQuery, ValueMatch};
use crate::error::{OutlineError, Result};

/// Exact title lookup, falling back to creating the page. The store's
/// `create_page` is itself create-if-absent, so two callers that both miss the
/// lookup still end up with the same page.
pub async fn get_or_create_by_title(store: &dyn GraphStore, title: &str) -> Result<NodeId> {
    let found = store
        .find_by_title(&TitleQuery::Exact(title.to_string()))
        .await?;
    if let Some(page) = found.into_iter().next() {
        return Ok(page.id);
    }
    tracing::debug!(title, "creating page");
    store.create_page(title).await
}

/// Daily note title, e.g. `October 16th, 2026`.
pub fn daily_title(date: NaiveDate) -> String {
    let month = match date.month() {
        1 => "January",
        2 => "February",
        3 => "March",
        4 => "April",
        5 => "May",
        6 => "June",
        7 => "July",
        8 => "August",
        9 => "September",
        10 => "October",
        11 => "November",
        _ => "December",
    };
    let day = date.day();
    let suffix = match day {
        1 | 21 | 31 => "st",
        2 | 22 => "nd",
        3 | 23 => "rd",
        _ => "th",
    };
    format!("{} {}{}, {}", month, day, suffix, date.year())
}

pub async fn open_daily_note(store: &dyn GraphStore, date: NaiveDate) -> Result<NodeId> {
    get_or_create_by_title(store, &daily_title(date)).await
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyNote {
    pub date: NaiveDate,
    pub title: String,
    pub page_id: NodeId,
}

/// The daily-notes feed: `count` days ending at `today`, newest first. Every
/// day's page is fetched or created.
pub async fn daily_notes(
    store: &dyn GraphStore,
    today: NaiveDate,
    count: usize,
) -> Result<Vec<DailyNote>> {
    let dates: Vec<NaiveDate> = std::iter::successors(Some(today), |d| d.pred_opt())
        .take(count)
        .collect();
    try_join_all(dates.into_iter().map(|date| async move {
        let title = daily_title(date);
        let page_id = get_or_create_by_title(store, &title).await?;
        Ok::<_, OutlineError>(DailyNote {
            date,
            title,
            page_id,
        })
    }))
    .await
}

/// Page suggestions for `[[` autocomplete: an exact match first, then fuzzy
/// title matches, at most [`SUGGESTION_LIMIT`] in total.
pub async fn suggest_pages(store: &dyn GraphStore, query: &str) -> Result<Vec<TitleMatch>> {
    if query.trim().is_empty() {
        return Ok(Vec::new());
    }
    let mut matches = store
        .find_by_title(&TitleQuery::Exact(query.to_string()))
        .await?;
    for candidate in store
        .find_by_title(&TitleQuery::Pattern(query.to_string()))
        .await?
    {
        if !matches.iter().any(|m| m.id == candidate.id) {
            matches.push(candidate);
        }
    }
    matches.truncate(SUGGESTION_LIMIT);
    Ok(matches)
}

/// Block suggestions for `((` autocomplete.
pub async fn suggest_blocks(store: &dyn GraphStore, query: &str) -> Result<Vec<ValueMatch>> {
    if query.trim().is_empty() {
        return Ok(Vec::new());
    }
    let mut matches = store.find_by_value_pattern(query).await?;
    matches.truncate(SUGGESTION_LIMIT);
    Ok(matches)
}
