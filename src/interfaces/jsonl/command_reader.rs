use crate::application::orchestrator::Decision;
use crate::error::Result;
use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::{BufRead, BufReader, Read};

/// One line of the JSONL command stream driving the CLI.
///
/// Commands name resources and bookings through caller-chosen `ref` labels;
/// the CLI resolves them to the ids the engine assigned. `payment_event` and
/// `refund_event` make the CLI act as the gateway: it builds the webhook
/// payload, signs it and feeds it through the real reconciliation path.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    AddResource {
        r#ref: String,
        name: String,
        unit_price_per_day: Decimal,
    },
    Create {
        r#ref: String,
        resource: String,
        activity_name: String,
        start_date: NaiveDate,
        end_date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
        payer_name: String,
        payer_email: String,
        #[serde(default)]
        proposal_document_ref: Option<String>,
    },
    Decide {
        booking: String,
        decision: Decision,
        #[serde(default)]
        reason: Option<String>,
    },
    Refund {
        booking: String,
        reason: String,
    },
    PaymentEvent {
        booking: String,
        status: String,
        #[serde(default)]
        payment_method: Option<String>,
    },
    RefundEvent {
        booking: String,
        status: String,
    },
    Sweep,
}

/// Streams commands from a JSONL source, one command per line.
///
/// Blank lines are skipped; a malformed line yields an `Err` item without
/// poisoning the rest of the stream.
pub struct CommandReader<R: Read> {
    reader: BufReader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: BufReader::new(source),
        }
    }

    pub fn commands(self) -> impl Iterator<Item = Result<Command>> {
        self.reader.lines().filter_map(|line| match line {
            Ok(line) if line.trim().is_empty() => None,
            Ok(line) => Some(serde_json::from_str(&line).map_err(Into::into)),
            Err(err) => Some(Err(err.into())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reader_valid_stream() {
        let data = concat!(
            r#"{"op":"add_resource","ref":"hall","name":"Main hall","unit_price_per_day":"100000"}"#,
            "\n\n",
            r#"{"op":"sweep"}"#,
            "\n",
        );
        let commands: Vec<_> = CommandReader::new(data.as_bytes()).commands().collect();

        assert_eq!(commands.len(), 2);
        assert_eq!(
            *commands[0].as_ref().unwrap(),
            Command::AddResource {
                r#ref: "hall".to_string(),
                name: "Main hall".to_string(),
                unit_price_per_day: dec!(100000),
            }
        );
        assert_eq!(*commands[1].as_ref().unwrap(), Command::Sweep);
    }

    #[test]
    fn test_reader_malformed_line() {
        let data = "{\"op\":\"unknown_op\"}\n{\"op\":\"sweep\"}\n";
        let commands: Vec<_> = CommandReader::new(data.as_bytes()).commands().collect();

        assert!(commands[0].is_err());
        assert!(commands[1].is_ok(), "stream continues past a bad line");
    }

    #[test]
    fn test_decide_defaults() {
        let line = r#"{"op":"decide","booking":"b1","decision":"approve"}"#;
        let command: Command = serde_json::from_str(line).unwrap();
        assert_eq!(
            command,
            Command::Decide {
                booking: "b1".to_string(),
                decision: Decision::Approve,
                reason: None,
            }
        );
    }
}
