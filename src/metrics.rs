//metrics.rs
use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, Counter, CounterVec, Histogram,
    HistogramOpts, Opts,
};

lazy_static! {
    pub static ref REGISTRATIONS: Counter = register_counter!(Opts::new(
        "device_registrations_total",
        "Total number of successful device registrations"
    ))
    .unwrap();

    pub static ref REGISTRATION_FAILURES: CounterVec = register_counter_vec!(
        Opts::new(
            "device_registration_failures_total",
            "Total number of failed device registrations by kind"
        ),
        &["kind"]
    )
    .unwrap();

    // Rows removed because another registration claimed their token
    pub static ref SUPERSEDED_DEVICES: Counter = register_counter!(Opts::new(
        "superseded_devices_removed_total",
        "Total number of device rows removed by token deduplication"
    ))
    .unwrap();

    pub static ref REGISTRATION_TIME: Histogram = register_histogram!(
        HistogramOpts::new(
            "device_registration_time_seconds",
            "Time taken to register a device, including the push service call"
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0])
    )
    .unwrap();
}

// Function to expose metrics endpoint
pub fn metrics_handler() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        return format!("Error encoding metrics: {}", e);
    }

    match String::from_utf8(buffer) {
        Ok(metrics) => metrics,
        Err(e) => format!("Error converting metrics to string: {}", e),
    }
}
