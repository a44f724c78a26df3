use crate::ledger::Ledger;
use futures_util::future;
use futures_util::{Stream, StreamExt};

/// One inspected message. Only `message_id` is ever persisted; the rest is
/// derived per scan pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaCandidate {
    pub message_id: i64,
    pub has_media: bool,
    pub suggested_filename: String,
}

/// Filters a lazy message stream down to the candidates that still need a
/// download: media-carrying messages whose id is not already in the ledger,
/// in the same relative order as the input.
///
/// `limit` bounds how many input messages are *examined*, not how many
/// candidates are yielded, so a scan over mostly text messages still stops
/// after `limit` pulls. Ledger membership is snapshotted when the plan is
/// built; the planner itself never writes to the ledger, the caller records
/// ids after each successful transfer. Errors from the underlying stream
/// pass through unchanged so the caller can abort the pass.
pub fn plan<S, E>(
    messages: S,
    ledger: &Ledger,
    limit: Option<usize>,
) -> impl Stream<Item = Result<MediaCandidate, E>>
where
    S: Stream<Item = Result<MediaCandidate, E>>,
{
    let seen = ledger.snapshot();
    let bounded = match limit {
        Some(n) => messages.take(n).left_stream(),
        None => messages.right_stream(),
    };
    bounded.filter(move |item| {
        let keep = match item {
            Ok(candidate) => candidate.has_media && !seen.contains(&candidate.message_id),
            Err(_) => true,
        };
        future::ready(keep)
    })
}
