use anyhow::bail;
use clap::{Parser, ValueEnum};
use core::time::Duration;
use leastload::{Backpressure, BalancerConfig};

/// Runtime configuration for the `leastload-sim` binary.
///
/// Every value can come from a CLI flag or an environment variable (a `.env`
/// file is loaded first). Defaults match a small local run: one worker per
/// CPU and a hundred clients hammering them.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "leastload-sim",
    version,
    about = "Drives a least-loaded balancer with synthetic clients"
)]
pub struct CliArgs {
    /// Number of worker tasks. Defaults to the number of logical CPUs.
    ///
    /// Environment variable: `WORKER_COUNT`
    #[arg(long, env = "WORKER_COUNT")]
    pub worker_count: Option<usize>,

    /// Capacity of each worker's request queue.
    ///
    /// Environment variable: `QUEUE_CAPACITY`
    #[arg(long, env = "QUEUE_CAPACITY", default_value_t = 1000)]
    pub queue_capacity: usize,

    /// Capacity of the shared intake channel in front of the dispatcher.
    ///
    /// Environment variable: `INTAKE_CAPACITY`
    #[arg(long, env = "INTAKE_CAPACITY", default_value_t = 1024)]
    pub intake_capacity: usize,

    /// What the dispatcher does when the chosen worker's queue is full.
    ///
    /// Environment variable: `BACKPRESSURE`
    #[arg(long, env = "BACKPRESSURE", value_enum, default_value_t = BackpressureArg::Wait)]
    pub backpressure: BackpressureArg,

    /// Seconds to wait for in-flight requests during shutdown.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 3)]
    pub shutdown_timeout: u64,

    /// Number of concurrent synthetic clients.
    ///
    /// Environment variable: `CLIENT_COUNT`
    #[arg(long, env = "CLIENT_COUNT", default_value_t = 100)]
    pub client_count: usize,

    /// Upper bound (exclusive) of the random pause between a client's
    /// requests, in microseconds.
    ///
    /// Environment variable: `MAX_CLIENT_DELAY_US`
    #[arg(long, env = "MAX_CLIENT_DELAY_US", default_value_t = 2_000)]
    pub max_client_delay_us: u64,

    /// How often the pool's load distribution is logged, in milliseconds.
    ///
    /// Environment variable: `REPORT_INTERVAL_MS`
    #[arg(long, env = "REPORT_INTERVAL_MS", default_value_t = 500)]
    pub report_interval_ms: u64,

    /// Stop after this many seconds. Runs until Ctrl+C when unset.
    ///
    /// Environment variable: `RUN_FOR_SECS`
    #[arg(long, env = "RUN_FOR_SECS")]
    pub run_for_secs: Option<u64>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackpressureArg {
    Reject,
    Wait,
}

impl From<BackpressureArg> for Backpressure {
    fn from(arg: BackpressureArg) -> Self {
        match arg {
            BackpressureArg::Reject => Self::Reject,
            BackpressureArg::Wait => Self::Wait,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub balancer: BalancerConfig,
    pub client_count: usize,
    pub max_client_delay: Duration,
    pub report_interval: Duration,
    pub run_for: Option<Duration>,
}

impl TryFrom<CliArgs> for SimConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let worker_count = args.worker_count.unwrap_or_else(num_cpus::get);

        if args.client_count == 0 {
            bail!("CLIENT_COUNT must be greater than 0");
        }
        if args.max_client_delay_us == 0 {
            bail!("MAX_CLIENT_DELAY_US must be greater than 0");
        }
        if args.report_interval_ms == 0 {
            bail!("REPORT_INTERVAL_MS must be greater than 0");
        }
        if args.run_for_secs == Some(0) {
            bail!("RUN_FOR_SECS must be greater than 0 when set");
        }

        let balancer = BalancerConfig {
            worker_count,
            queue_capacity: args.queue_capacity,
            intake_capacity: args.intake_capacity,
            backpressure: args.backpressure.into(),
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
        };
        balancer.validate()?;

        Ok(Self {
            balancer,
            client_count: args.client_count,
            max_client_delay: Duration::from_micros(args.max_client_delay_us),
            report_interval: Duration::from_millis(args.report_interval_ms),
            run_for: args.run_for_secs.map(Duration::from_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<SimConfig> {
        let args = CliArgs::try_parse_from(std::iter::once("leastload-sim").chain(args.iter().copied()))?;
        SimConfig::try_from(args)
    }

    #[test]
    fn explicit_flags_are_converted() {
        let config = parse(&[
            "--worker-count",
            "4",
            "--queue-capacity",
            "8",
            "--backpressure",
            "reject",
            "--shutdown-timeout",
            "5",
            "--client-count",
            "16",
            "--max-client-delay-us",
            "250",
            "--report-interval-ms",
            "100",
            "--run-for-secs",
            "2",
        ])
        .unwrap();

        assert_eq!(config.balancer.worker_count, 4);
        assert_eq!(config.balancer.queue_capacity, 8);
        assert_eq!(config.balancer.backpressure, Backpressure::Reject);
        assert_eq!(config.balancer.shutdown_timeout, Duration::from_secs(5));
        assert_eq!(config.client_count, 16);
        assert_eq!(config.max_client_delay, Duration::from_micros(250));
        assert_eq!(config.report_interval, Duration::from_millis(100));
        assert_eq!(config.run_for, Some(Duration::from_secs(2)));
    }

    #[test]
    fn worker_count_defaults_to_cpu_count() {
        let config = parse(&["--worker-count", "0"]);
        assert!(config.is_err());

        let args = CliArgs::try_parse_from(["leastload-sim"]).unwrap();
        if args.worker_count.is_none() {
            let config = SimConfig::try_from(args).unwrap();
            assert_eq!(config.balancer.worker_count, num_cpus::get());
        }
    }

    #[test]
    fn zero_values_are_rejected() {
        for flag in [
            "--queue-capacity",
            "--intake-capacity",
            "--client-count",
            "--max-client-delay-us",
            "--report-interval-ms",
            "--run-for-secs",
        ] {
            assert!(parse(&[flag, "0"]).is_err(), "{flag} 0 should be rejected");
        }
    }

    #[test]
    fn backpressure_defaults_to_wait() {
        let args = CliArgs::try_parse_from(["leastload-sim"]).unwrap();
        if std::env::var_os("BACKPRESSURE").is_none() {
            assert_eq!(args.backpressure, BackpressureArg::Wait);
        }
    }

    #[test]
    fn unknown_backpressure_is_a_parse_error() {
        assert!(parse(&["--backpressure", "drop"]).is_err());
    }
}
