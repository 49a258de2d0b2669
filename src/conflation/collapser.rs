//! Per-tick backlog drain.
//!
//! Turns whatever the subscriber has queued into the units of work for one
//! poll tick, according to the active [`BackpressurePolicy`].

use tracing::{debug, trace, warn};

use super::policy::BackpressurePolicy;
use crate::error::{RecvError, TransportError};
use crate::model::{DecodedEnvelope, Envelope};
use crate::network::Subscriber;

/// Safety cap for [`discard_backlog`].
pub const MAX_DISCARD: usize = 1000;

/// What one drain produced.
#[derive(Debug, Default)]
pub struct DrainReport {
    /// Envelopes to dispatch, in dispatch order.
    pub envelopes: Vec<Envelope>,
    /// Envelopes taken off the feed.
    pub received: u64,
    /// Decoded envelopes superseded by a later one in the same burst.
    pub collapsed: u64,
    pub decode_errors: u64,
    /// The drain stopped at the policy limit with input possibly left over.
    pub limit_reached: bool,
    /// The feed failed during the drain. Envelopes read before the failure
    /// are still in `envelopes`.
    pub transport_error: Option<TransportError>,
}

/// Drain one tick's worth of envelopes from `subscriber`.
pub fn drain<S: Subscriber>(subscriber: &mut S, policy: &BackpressurePolicy) -> DrainReport {
    match *policy {
        BackpressurePolicy::Bounded { max_per_tick } => drain_bounded(subscriber, max_per_tick),
        BackpressurePolicy::CollapseLatest { max_drain, merge } => {
            drain_collapse(subscriber, max_drain, merge)
        }
    }
}

fn drain_bounded<S: Subscriber>(subscriber: &mut S, max_per_tick: u32) -> DrainReport {
    let mut report = DrainReport::default();
    let mut calls = 0;

    while calls < max_per_tick {
        calls += 1;
        match subscriber.receive_non_blocking() {
            Ok(envelope) => {
                report.received += 1;
                report.envelopes.push(envelope);
            }
            Err(RecvError::WouldBlock) => return report,
            Err(RecvError::Decode(e)) => {
                debug!("Dropping malformed envelope: {}", e);
                report.decode_errors += 1;
            }
            Err(RecvError::Transport(e)) => {
                report.transport_error = Some(e);
                return report;
            }
        }
    }

    report.limit_reached = true;
    report
}

fn drain_collapse<S: Subscriber>(subscriber: &mut S, max_drain: u32, merge: bool) -> DrainReport {
    let mut report = DrainReport::default();
    let mut merged: Option<DecodedEnvelope> = None;
    let mut drained = 0;

    loop {
        if drained >= max_drain {
            report.limit_reached = true;
            break;
        }
        drained += 1;

        match subscriber.receive_non_blocking() {
            Ok(Envelope::Decoded(decoded)) => {
                report.received += 1;
                merged = Some(match merged {
                    None => decoded,
                    Some(acc) => {
                        report.collapsed += 1;
                        if merge {
                            merge_into(acc, decoded)
                        } else {
                            decoded
                        }
                    }
                });
            }
            Ok(raw @ Envelope::Raw(_)) => {
                // Raw frames carry no signal map; they pass through one by one.
                report.received += 1;
                report.envelopes.push(raw);
            }
            Err(RecvError::WouldBlock) => break,
            Err(RecvError::Decode(e)) => {
                debug!("Dropping malformed envelope: {}", e);
                report.decode_errors += 1;
            }
            Err(RecvError::Transport(e)) => {
                report.transport_error = Some(e);
                break;
            }
        }
    }

    if report.limit_reached {
        warn!(
            "Drain limit of {} reached, {} envelopes collapsed this tick",
            max_drain, report.collapsed
        );
    } else if report.collapsed > 0 {
        trace!("Collapsed {} envelopes", report.collapsed);
    }

    if let Some(decoded) = merged {
        report.envelopes.push(Envelope::Decoded(decoded));
    }
    report
}

/// Header fields stay those of `acc`. Each signal keeps the value of the
/// last envelope that carried it, independently of other signals.
fn merge_into(mut acc: DecodedEnvelope, next: DecodedEnvelope) -> DecodedEnvelope {
    for (name, value) in next.data {
        acc.data.insert(name, value);
    }
    acc
}

/// Drop every immediately available envelope, up to [`MAX_DISCARD`].
///
/// Returns how many were discarded.
pub fn discard_backlog<S: Subscriber>(subscriber: &mut S) -> usize {
    let mut discarded = 0;
    while discarded < MAX_DISCARD {
        match subscriber.receive_non_blocking() {
            Ok(_) | Err(RecvError::Decode(_)) => discarded += 1,
            Err(RecvError::WouldBlock) | Err(RecvError::Transport(_)) => break,
        }
    }
    discarded
}
