// config.rs

/// Which gateway implementation the lifecycle engine talks to. This is the
/// single switch for skipping real card-network calls on staging; nothing
/// else in the codebase re-checks the environment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PaymentMode {
    Live,
    TestBypass,
}

impl PaymentMode {
    fn from_env() -> PaymentMode {
        match std::env::var("PAYMENT_MODE").as_deref() {
            Ok("test_bypass") => PaymentMode::TestBypass,
            _ => PaymentMode::Live,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub stripe_secret_key: String,
    pub payment_mode: PaymentMode,
    /// Hours after hustler-completion before the sweep releases funds
    /// without customer confirmation.
    pub auto_release_hours: i64,
    pub sweep_interval_secs: u64,
    /// Authorization headroom multiplier applied to estimated hours when
    /// pre-authorizing hourly jobs.
    pub hourly_auth_buffer: f64,
    /// Customers may not cancel within this many hours of the scheduled
    /// start.
    pub cancel_cutoff_hours: i64,
}

impl Config {
    pub fn init() -> Config {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let stripe_secret_key = std::env::var("STRIPE_SECRET_KEY")
            .unwrap_or_else(|_| "sk_test_placeholder".to_string());

        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(8000);
        let auto_release_hours = std::env::var("AUTO_RELEASE_HOURS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(48);
        let sweep_interval_secs = std::env::var("SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(600);
        let hourly_auth_buffer = std::env::var("HOURLY_AUTH_BUFFER")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(1.2);
        let cancel_cutoff_hours = std::env::var("CANCEL_CUTOFF_HOURS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(2);

        Config {
            database_url,
            port,
            stripe_secret_key,
            payment_mode: PaymentMode::from_env(),
            auto_release_hours,
            sweep_interval_secs,
            hourly_auth_buffer,
            cancel_cutoff_hours,
        }
    }
}
