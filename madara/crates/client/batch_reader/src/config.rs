use anyhow::{bail, Context};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fs::File;
use std::path::Path;
use std::time::Duration;

/// Default maximum number of calls sent in one round trip.
pub const DEFAULT_BATCH_SIZE_LIMIT: usize = 100;
/// Default divisor applied to the batch size after a failed attempt.
pub const DEFAULT_BACK_OFF_MULTIPLIER: usize = 5;
/// Default maximum number of round trips in flight at once.
pub const DEFAULT_MAX_PARALLEL_ROUND_TRIPS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchCallerConfig {
    pub batch_size_limit: usize,
    pub back_off_multiplier: usize,
    pub max_parallel_round_trips: usize,
    #[serde(
        deserialize_with = "deserialize_optional_duration",
        serialize_with = "serialize_optional_duration",
        skip_serializing_if = "Option::is_none"
    )]
    pub round_trip_timeout: Option<Duration>,
}

impl Default for BatchCallerConfig {
    fn default() -> Self {
        Self {
            batch_size_limit: DEFAULT_BATCH_SIZE_LIMIT,
            back_off_multiplier: DEFAULT_BACK_OFF_MULTIPLIER,
            max_parallel_round_trips: DEFAULT_MAX_PARALLEL_ROUND_TRIPS,
            round_trip_timeout: None,
        }
    }
}

impl BatchCallerConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("Opening batch caller config {}", path.display()))?;
        serde_json::from_reader(file).with_context(|| format!("Decoding batch caller config {}", path.display()))
    }

    /// Batch size limit, never below one call per round trip.
    pub fn effective_batch_size_limit(&self) -> usize {
        self.batch_size_limit.max(1)
    }

    pub fn effective_max_parallel_round_trips(&self) -> usize {
        self.max_parallel_round_trips.max(1)
    }
}

#[derive(Clone, Debug, clap::Args)]
pub struct BatchCallerParams {
    /// Maximum number of contract calls sent to the L1 node in a single JSON-RPC batch.
    #[arg(env = "MADARA_L1_BATCH_SIZE_LIMIT", long, default_value_t = DEFAULT_BATCH_SIZE_LIMIT)]
    pub l1_batch_size_limit: usize,

    /// When a batch fails, the batch size is divided by this value before retrying.
    #[arg(env = "MADARA_L1_BATCH_BACK_OFF_MULTIPLIER", long, default_value_t = DEFAULT_BACK_OFF_MULTIPLIER)]
    pub l1_batch_back_off_multiplier: usize,

    /// Maximum number of batches in flight at the same time. Set to 1 to send batches one by one.
    #[arg(env = "MADARA_L1_BATCH_MAX_PARALLEL", long, default_value_t = DEFAULT_MAX_PARALLEL_ROUND_TRIPS)]
    pub l1_batch_max_parallel: usize,

    /// Give up on a batch round trip after this long, and retry with smaller batches.
    #[arg(env = "MADARA_L1_BATCH_ROUND_TRIP_TIMEOUT", long, value_parser = parse_duration)]
    pub l1_batch_round_trip_timeout: Option<Duration>,
}

impl From<BatchCallerParams> for BatchCallerConfig {
    fn from(params: BatchCallerParams) -> Self {
        Self {
            batch_size_limit: params.l1_batch_size_limit,
            back_off_multiplier: params.l1_batch_back_off_multiplier,
            max_parallel_round_trips: params.l1_batch_max_parallel,
            round_trip_timeout: params.l1_batch_round_trip_timeout,
        }
    }
}

/// Parses durations such as `500ms`, `10s`, `2min` or `1h`.
pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim();
    let Some(unit_start) = s.find(|c: char| !c.is_ascii_digit()) else {
        bail!("Missing unit in duration {s:?}");
    };
    let (amount, unit) = s.split_at(unit_start);
    let amount: u64 = amount.parse().with_context(|| format!("Invalid duration amount in {s:?}"))?;

    let duration = match unit.trim() {
        "ms" => Duration::from_millis(amount),
        "s" => Duration::from_secs(amount),
        "min" => Duration::from_secs(amount.saturating_mul(60)),
        "h" => Duration::from_secs(amount.saturating_mul(3600)),
        unit => bail!("Unknown duration unit {unit:?}, expected one of ms, s, min, h"),
    };
    Ok(duration)
}

fn deserialize_optional_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|s| parse_duration(&s).map_err(serde::de::Error::custom))
        .transpose()
}

fn serialize_optional_duration<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match duration {
        Some(duration) if duration.subsec_nanos() == 0 => serializer.serialize_str(&format!("{}s", duration.as_secs())),
        Some(duration) => serializer.serialize_str(&format!("{}ms", duration.as_millis())),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use rstest::*;
    use std::io::Write;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        params: BatchCallerParams,
    }

    #[rstest]
    #[case("250ms", Duration::from_millis(250))]
    #[case("10s", Duration::from_secs(10))]
    #[case(" 3 min", Duration::from_secs(180))]
    #[case("2h", Duration::from_secs(7200))]
    fn parses_durations(#[case] input: &str, #[case] expected: Duration) {
        assert_eq!(parse_duration(input).unwrap(), expected);
    }

    #[rstest]
    #[case("10")]
    #[case("s10")]
    #[case("1.5s")]
    #[case("3 days")]
    fn rejects_bad_durations(#[case] input: &str) {
        assert!(parse_duration(input).is_err());
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: BatchCallerConfig = serde_json::from_str(r#"{ "back_off_multiplier": 2 }"#).unwrap();

        assert_eq!(config, BatchCallerConfig { back_off_multiplier: 2, ..Default::default() });
    }

    #[test]
    fn round_trip_timeout_is_human_readable() {
        let config = BatchCallerConfig { round_trip_timeout: Some(Duration::from_millis(1500)), ..Default::default() };

        let json = serde_json::to_value(config).unwrap();
        assert_eq!(json["round_trip_timeout"], "1500ms");
        assert_eq!(serde_json::from_value::<BatchCallerConfig>(json).unwrap(), config);
    }

    #[test]
    fn loads_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "batch_size_limit": 20, "max_parallel_round_trips": 1, "round_trip_timeout": "5s" }}"#)
            .unwrap();

        let config = BatchCallerConfig::from_json_file(file.path()).unwrap();

        assert_eq!(config.batch_size_limit, 20);
        assert_eq!(config.back_off_multiplier, DEFAULT_BACK_OFF_MULTIPLIER);
        assert_eq!(config.max_parallel_round_trips, 1);
        assert_eq!(config.round_trip_timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn params_default_to_the_documented_values() {
        let cli = Cli::parse_from(["madara"]);

        assert_eq!(BatchCallerConfig::from(cli.params), BatchCallerConfig::default());
    }

    #[test]
    fn params_map_onto_config() {
        let cli = Cli::parse_from([
            "madara",
            "--l1-batch-size-limit",
            "20",
            "--l1-batch-back-off-multiplier",
            "2",
            "--l1-batch-max-parallel",
            "1",
            "--l1-batch-round-trip-timeout",
            "30s",
        ]);

        assert_eq!(
            BatchCallerConfig::from(cli.params),
            BatchCallerConfig {
                batch_size_limit: 20,
                back_off_multiplier: 2,
                max_parallel_round_trips: 1,
                round_trip_timeout: Some(Duration::from_secs(30)),
            }
        );
    }

    #[rstest]
    #[case(0, 0, 1, 1)]
    #[case(50, 4, 50, 4)]
    fn degenerate_limits_are_clamped(
        #[case] batch_size_limit: usize,
        #[case] max_parallel_round_trips: usize,
        #[case] expected_batch: usize,
        #[case] expected_parallel: usize,
    ) {
        let config = BatchCallerConfig { batch_size_limit, max_parallel_round_trips, ..Default::default() };

        assert_eq!(config.effective_batch_size_limit(), expected_batch);
        assert_eq!(config.effective_max_parallel_round_trips(), expected_parallel);
    }
}
