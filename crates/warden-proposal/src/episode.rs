use chrono::Utc;
use uuid::Uuid;

use warden_ledger::Episode;

use crate::proposal::Proposal;

/// Maximum number of topics on an episode.
const TOPIC_CAP: usize = 5;

/// Render a human-readable outcome summary. Every modification string is
/// included verbatim so the learning consumer sees exactly what was
/// overlaid onto the action.
pub fn format_outcome(proposal: &Proposal, success: bool, detail: Option<&str>) -> String {
    let verdict = if success {
        "completed successfully"
    } else {
        "failed"
    };
    let mut summary = format!(
        "Proposal '{}' ({} via {}) {}",
        proposal.title, proposal.proposal_type, proposal.proposed_action.action_type, verdict
    );
    if !proposal.modifications.is_empty() {
        summary.push_str(" with modifications: ");
        summary.push_str(&proposal.modifications.join("; "));
    }
    if let Some(detail) = detail {
        summary.push_str(" — ");
        summary.push_str(detail);
    }
    summary
}

/// Extract retrieval topics for an episode.
///
/// `proposal_type` and `action_type` always come first, in that order, and
/// are never evicted by the cap. Up to three more topics are drawn from
/// title + reasoning words longer than four characters.
pub fn extract_topics(proposal: &Proposal) -> Vec<String> {
    let mut topics = Vec::with_capacity(TOPIC_CAP);
    if !proposal.proposal_type.is_empty() {
        topics.push(proposal.proposal_type.to_lowercase());
    }
    let action_type = proposal.proposed_action.action_type.to_lowercase();
    if !action_type.is_empty() && !topics.contains(&action_type) {
        topics.push(action_type);
    }

    let text = format!("{} {}", proposal.title, proposal.reasoning);
    for word in text.split(|c: char| !c.is_alphanumeric() && c != '_') {
        if topics.len() >= TOPIC_CAP {
            break;
        }
        if word.len() <= 4 {
            continue;
        }
        let word = word.to_lowercase();
        if !topics.contains(&word) {
            topics.push(word);
        }
    }
    topics
}

/// Build the immutable episode for a finished proposal.
pub fn synthesize_episode(proposal: &Proposal, success: bool, detail: Option<&str>) -> Episode {
    Episode {
        id: format!("ep_{}", Uuid::new_v4()),
        proposal_id: proposal.id.clone(),
        summary: format_outcome(proposal, success, detail),
        success,
        topics: extract_topics(proposal),
        created_at: Utc::now(),
    }
}
