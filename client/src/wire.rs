//! JSON records exchanged with the backend and their conversion into
//! domain types.
//!
//! Records are lenient about optional fields and the handful of field-name
//! variants the backend has used over time; conversion into domain types is
//! strict about statuses and timestamps.

use serde::{Deserialize, Serialize};
use votebox_types::{
    parse_timestamp, CommittedState, DuplicateCheck, SimilarityMatch, Suggestion, SuggestionId,
    SuggestionStatus, VoteState,
};

use crate::error::ServiceError;

fn clamp_count(raw: i64) -> u32 {
    raw.clamp(0, u32::MAX as i64) as u32
}

fn vote_state_of(vote_type: Option<&str>, has_voted: bool) -> Result<VoteState, ServiceError> {
    match vote_type {
        Some(raw) => {
            VoteState::parse(raw).map_err(|e| ServiceError::InvalidResponse(e.to_string()))
        }
        None => Ok(VoteState::from_has_voted(has_voted)),
    }
}

// ── Suggestions ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct SuggestionRecord {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "votes")]
    pub vote_count: i64,
    #[serde(default = "default_status")]
    pub status: String,
    pub created_at: String,
    #[serde(default)]
    pub user_has_voted: bool,
    #[serde(default)]
    pub vote_type: Option<String>,
}

fn default_status() -> String {
    "pending".to_string()
}

impl TryFrom<SuggestionRecord> for Suggestion {
    type Error = ServiceError;

    fn try_from(r: SuggestionRecord) -> Result<Self, Self::Error> {
        let status = SuggestionStatus::parse(&r.status)
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))?;
        let created_at = parse_timestamp(&r.created_at)
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))?;
        let vote_state = vote_state_of(r.vote_type.as_deref(), r.user_has_voted)?;
        Ok(Suggestion {
            id: SuggestionId::new(r.id),
            title: r.title,
            description: r.description,
            vote_count: clamp_count(r.vote_count),
            vote_state,
            status,
            created_at,
            author: r.user_id.unwrap_or_default(),
        })
    }
}

/// Convert a list, failing on the first malformed record.
pub fn suggestions_from(records: Vec<SuggestionRecord>) -> Result<Vec<Suggestion>, ServiceError> {
    records.into_iter().map(Suggestion::try_from).collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateBody<'a> {
    pub title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'a str>,
}

// ── Votes ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct VoteBody {
    pub vote_type: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoteRecord {
    #[serde(default)]
    pub suggestion_id: Option<String>,
    #[serde(alias = "vote_count")]
    pub new_vote_count: i64,
    #[serde(default)]
    pub user_has_voted: bool,
    #[serde(default)]
    pub vote_type: Option<String>,
}

impl TryFrom<VoteRecord> for CommittedState {
    type Error = ServiceError;

    fn try_from(r: VoteRecord) -> Result<Self, Self::Error> {
        let vote_state = vote_state_of(r.vote_type.as_deref(), r.user_has_voted)?;
        Ok(CommittedState::new(clamp_count(r.new_vote_count), vote_state))
    }
}

// ── Similarity ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct SimilarityQuery<'a> {
    pub query: &'a str,
    pub limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchRecord {
    #[serde(alias = "suggestion_id")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "text")]
    pub suggestion_text: Option<String>,
    #[serde(default, alias = "votes")]
    pub vote_count: i64,
    #[serde(default, alias = "similarity_score", alias = "score")]
    pub similarity: f64,
}

impl From<MatchRecord> for SimilarityMatch {
    fn from(r: MatchRecord) -> Self {
        let text = match (r.suggestion_text, r.title, r.description) {
            (Some(text), _, _) => text,
            (None, Some(title), Some(desc)) if !desc.trim().is_empty() => {
                format!("{title} {desc}")
            }
            (None, Some(title), _) => title,
            (None, None, desc) => desc.unwrap_or_default(),
        };
        SimilarityMatch::new(
            SuggestionId::new(r.id),
            text,
            clamp_count(r.vote_count),
            r.similarity,
        )
    }
}

/// The similarity endpoint answers either a bare list or a wrapped one.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SimilarityResponse {
    List(Vec<MatchRecord>),
    Wrapped {
        #[serde(alias = "matches", alias = "results")]
        similar_suggestions: Vec<MatchRecord>,
    },
}

impl SimilarityResponse {
    pub fn into_matches(self) -> Vec<SimilarityMatch> {
        let records = match self {
            Self::List(records) => records,
            Self::Wrapped {
                similar_suggestions,
            } => similar_suggestions,
        };
        let mut matches: Vec<SimilarityMatch> =
            records.into_iter().map(SimilarityMatch::from).collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DuplicateCheckRecord {
    pub duplicate_found: bool,
    #[serde(default, alias = "matches")]
    pub similar_suggestions: Vec<MatchRecord>,
    #[serde(default)]
    pub message: Option<String>,
}

impl From<DuplicateCheckRecord> for DuplicateCheck {
    fn from(r: DuplicateCheckRecord) -> Self {
        let mut matches: Vec<SimilarityMatch> = r
            .similar_suggestions
            .into_iter()
            .map(SimilarityMatch::from)
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        DuplicateCheck {
            duplicate_found: r.duplicate_found,
            matches,
            message: r.message,
        }
    }
}

// ── Auth & health ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterBody<'a> {
    pub email: &'a str,
    pub password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthRecord {
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggestion_record_from_backend_json() {
        let json = r#"{
            "id": "S1",
            "user_id": "U7",
            "title": "Better food options",
            "description": null,
            "vote_count": 12,
            "status": "pending",
            "created_at": "2024-05-02 09:00:00.5+00:00",
            "user_has_voted": true
        }"#;
        let record: SuggestionRecord = serde_json::from_str(json).unwrap();
        let s = Suggestion::try_from(record).unwrap();
        assert_eq!(s.id.as_str(), "S1");
        assert_eq!(s.vote_count, 12);
        assert_eq!(s.vote_state, VoteState::Upvoted);
        assert_eq!(s.author, "U7");
    }

    #[test]
    fn unknown_status_is_invalid_response() {
        let json = r#"{"id":"S1","title":"t","status":"archived","created_at":"2024-05-02T09:00:00Z"}"#;
        let record: SuggestionRecord = serde_json::from_str(json).unwrap();
        assert!(matches!(
            Suggestion::try_from(record),
            Err(ServiceError::InvalidResponse(_))
        ));
    }

    #[test]
    fn vote_record_prefers_explicit_vote_type() {
        let toggle: VoteRecord = serde_json::from_str(
            r#"{"suggestion_id":"S1","new_vote_count":13,"user_has_voted":true}"#,
        )
        .unwrap();
        assert_eq!(
            CommittedState::try_from(toggle).unwrap(),
            CommittedState::new(13, VoteState::Upvoted)
        );

        let directional: VoteRecord = serde_json::from_str(
            r#"{"new_vote_count":4,"user_has_voted":true,"vote_type":"downvote"}"#,
        )
        .unwrap();
        assert_eq!(
            CommittedState::try_from(directional).unwrap(),
            CommittedState::new(4, VoteState::Downvoted)
        );
    }

    #[test]
    fn negative_counts_clamp_to_zero() {
        let record: VoteRecord =
            serde_json::from_str(r#"{"new_vote_count":-3,"user_has_voted":false}"#).unwrap();
        assert_eq!(CommittedState::try_from(record).unwrap().vote_count, 0);
    }

    #[test]
    fn similarity_response_accepts_both_shapes() {
        let list: SimilarityResponse = serde_json::from_str(
            r#"[{"id":"A","suggestion_text":"Longer lunch","votes":3,"similarity_score":0.4},
                {"id":"B","title":"More fruit","vote_count":8,"similarity":0.9}]"#,
        )
        .unwrap();
        let matches = list.into_matches();
        assert_eq!(matches[0].suggestion_id.as_str(), "B");
        assert_eq!(matches[0].snapshot_text, "More fruit");
        assert_eq!(matches[1].snapshot_vote_count, 3);

        let wrapped: SimilarityResponse =
            serde_json::from_str(r#"{"similar_suggestions":[{"id":"C","title":"x","similarity":1.7}]}"#)
                .unwrap();
        let matches = wrapped.into_matches();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].score, 1.0);
    }

    #[test]
    fn duplicate_check_record_conversion() {
        let record: DuplicateCheckRecord = serde_json::from_str(
            r#"{"duplicate_found":true,
                "similar_suggestions":[{"id":"S1","title":"Better food","description":"options","vote_count":12,"similarity":0.87}],
                "message":"similar suggestion exists"}"#,
        )
        .unwrap();
        let check = DuplicateCheck::from(record);
        assert!(check.has_duplicates());
        let top = check.top().unwrap();
        assert_eq!(top.snapshot_text, "Better food options");
        assert_eq!(top.snapshot_vote_count, 12);
    }
}
