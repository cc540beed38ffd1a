use crate::git::remote::RemoteRefSnapshot;

/// Whether `candidate` shows the tracked branch moved since `baseline`.
///
/// Only a conclusive candidate can report a change; an inconclusive probe is
/// handled exactly like "no change" so the watcher keeps polling instead of
/// acting on a failed query. Outputs are compared as raw text.
pub fn changed(baseline: &RemoteRefSnapshot, candidate: &RemoteRefSnapshot) -> bool {
    candidate.is_conclusive() && candidate.raw_output != baseline.raw_output
}
