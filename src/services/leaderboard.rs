use serde::{Deserialize, Serialize};

use crate::models::Participant;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub username: String,
    pub score: i64,
    pub rank: u32,
}

/// Ranked standings for a session, derived from the participants' answer
/// history. Ordering: score descending, then cumulative answer time
/// ascending (earlier total submission time wins), then user id. Ranks are
/// dense, 1-based, one per participant, so the same input always produces
/// the same ranking.
pub fn standings<'a, I>(participants: I) -> Vec<LeaderboardEntry>
where
    I: IntoIterator<Item = &'a Participant>,
{
    let mut ordered: Vec<&Participant> = participants.into_iter().collect();
    ordered.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.total_answer_time_ms.cmp(&b.total_answer_time_ms))
            .then_with(|| a.user_id.cmp(&b.user_id))
    });

    ordered
        .into_iter()
        .enumerate()
        .map(|(i, p)| LeaderboardEntry {
            user_id: p.user_id.clone(),
            username: p.username.clone(),
            score: p.score,
            rank: (i + 1) as u32,
        })
        .collect()
}

/// The first `n` entries, for live broadcasts. The full ranking stays
/// available over REST so a participant can always locate their own rank.
pub fn top(entries: &[LeaderboardEntry], n: usize) -> Vec<LeaderboardEntry> {
    entries.iter().take(n).cloned().collect()
}
