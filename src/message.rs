//! Fixed-format text messages exchanged with workers.
//!
//! Request (engine → worker): the granted quantum in nanoseconds, decimal.
//! Response (worker → engine):
//! `<code> <usedNanoseconds>[ <wakeSeconds> <wakeMillis>]` — a single
//! status character, the burst length actually used, and, for the I/O-block
//! code only, the relative delay before the process becomes ready again.
//! `parse(encode(x)) == x` holds for all four response kinds; this is the
//! only wire contract the engine depends on.

use anyhow::{bail, Context, Result};

use crate::types::TimeNs;

/// Status character: the process finished inside its quantum.
pub const TERMINATION_CODE: char = 't';
/// Status character: the process consumed the entire quantum.
pub const FULL_QUANTUM_CODE: char = 'q';
/// Status character: the process is waiting on simulated I/O.
pub const IO_BLOCK_CODE: char = 'b';
/// Status character: the process was preempted mid-burst.
pub const PREEMPTION_CODE: char = 'p';

/// One of the four possible results of a dispatched burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BurstOutcome {
    Terminated { used_ns: TimeNs },
    UsedFullQuantum { used_ns: TimeNs },
    BlockedForIo {
        used_ns: TimeNs,
        /// Relative wake delay, whole seconds.
        wake_secs: u32,
        /// Relative wake delay, milliseconds past `wake_secs`.
        wake_millis: u32,
    },
    Preempted { used_ns: TimeNs },
}

impl BurstOutcome {
    /// Nanoseconds of CPU the worker reports using, whatever the outcome.
    pub fn used_ns(&self) -> TimeNs {
        match *self {
            BurstOutcome::Terminated { used_ns }
            | BurstOutcome::UsedFullQuantum { used_ns }
            | BurstOutcome::BlockedForIo { used_ns, .. }
            | BurstOutcome::Preempted { used_ns } => used_ns,
        }
    }

    /// Render the response in wire format.
    pub fn encode(&self) -> String {
        match *self {
            BurstOutcome::Terminated { used_ns } => format!("{TERMINATION_CODE} {used_ns}"),
            BurstOutcome::UsedFullQuantum { used_ns } => format!("{FULL_QUANTUM_CODE} {used_ns}"),
            BurstOutcome::BlockedForIo {
                used_ns,
                wake_secs,
                wake_millis,
            } => format!("{IO_BLOCK_CODE} {used_ns} {wake_secs} {wake_millis}"),
            BurstOutcome::Preempted { used_ns } => format!("{PREEMPTION_CODE} {used_ns}"),
        }
    }

    /// Parse a wire-format response. Unknown codes, missing fields, trailing
    /// fields, and non-decimal numbers are all malformed — a fatal protocol
    /// violation, not something to paper over.
    pub fn parse(text: &str) -> Result<Self> {
        let mut fields = text.split(' ');
        let code = fields
            .next()
            .filter(|f| !f.is_empty())
            .with_context(|| format!("empty response message {text:?}"))?;
        let used_ns: TimeNs = fields
            .next()
            .with_context(|| format!("response {text:?} is missing the burst length"))?
            .parse()
            .with_context(|| format!("bad burst length in response {text:?}"))?;
        let outcome = match code {
            "t" => BurstOutcome::Terminated { used_ns },
            "q" => BurstOutcome::UsedFullQuantum { used_ns },
            "p" => BurstOutcome::Preempted { used_ns },
            "b" => {
                let wake_secs = fields
                    .next()
                    .with_context(|| format!("response {text:?} is missing wake seconds"))?
                    .parse()
                    .with_context(|| format!("bad wake seconds in response {text:?}"))?;
                let wake_millis = fields
                    .next()
                    .with_context(|| format!("response {text:?} is missing wake millis"))?
                    .parse()
                    .with_context(|| format!("bad wake millis in response {text:?}"))?;
                BurstOutcome::BlockedForIo {
                    used_ns,
                    wake_secs,
                    wake_millis,
                }
            }
            other => bail!("unknown response code {other:?} in {text:?}"),
        };
        if fields.next().is_some() {
            bail!("trailing fields in response {text:?}");
        }
        Ok(outcome)
    }
}

/// Render a quantum grant in wire format.
pub fn encode_quantum_grant(quantum_ns: TimeNs) -> String {
    quantum_ns.to_string()
}

/// Parse a quantum grant from wire format.
pub fn parse_quantum_grant(text: &str) -> Result<TimeNs> {
    text.parse()
        .with_context(|| format!("bad quantum grant {text:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_each_kind() {
        let outcomes = [
            BurstOutcome::Terminated { used_ns: 123_456 },
            BurstOutcome::UsedFullQuantum { used_ns: 10_000_000 },
            BurstOutcome::BlockedForIo {
                used_ns: 42,
                wake_secs: 3,
                wake_millis: 250,
            },
            BurstOutcome::Preempted { used_ns: 0 },
        ];
        for outcome in outcomes {
            let wire = outcome.encode();
            assert_eq!(BurstOutcome::parse(&wire).unwrap(), outcome, "wire: {wire}");
        }
    }

    #[test]
    fn test_wire_shapes() {
        assert_eq!(
            BurstOutcome::Terminated { used_ns: 7 }.encode(),
            "t 7"
        );
        assert_eq!(
            BurstOutcome::BlockedForIo {
                used_ns: 7,
                wake_secs: 1,
                wake_millis: 500
            }
            .encode(),
            "b 7 1 500"
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in [
            "",
            "x 100",
            "t",
            "t abc",
            "t 100 200",
            "b 100",
            "b 100 2",
            "b 100 2 xyz",
            "b 100 2 300 4",
            "q -5",
        ] {
            assert!(
                BurstOutcome::parse(bad).is_err(),
                "{bad:?} should not parse"
            );
        }
    }

    #[test]
    fn test_quantum_grant_round_trip() {
        let wire = encode_quantum_grant(2_500_000);
        assert_eq!(parse_quantum_grant(&wire).unwrap(), 2_500_000);
        assert!(parse_quantum_grant("ten").is_err());
    }
}
