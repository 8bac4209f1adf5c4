use esp_config::{generate_config, Value};

fn main() {
    // emit config
    generate_config(
        "esp_pwm_capture",
        &[
            (
                "max_lines",
                Value::UnsignedInteger(64),
                "Number of GPIO lines the dispatch service can route interrupts for. \
                 Lines numbered at or above this value are rejected.",
            ),
            (
                "default_queue_capacity",
                Value::UnsignedInteger(16),
                "Queue capacity used by `CaptureChannel::configure_default`.",
            ),
            (
                "discard_first_cycle",
                Value::Bool(true),
                "Default of `Config::discard_first_cycle`. When enabled, the first cycle after \
                 `start` (which has no reference edge) is never enqueued.",
            ),
            (
                "place_isr_in_ram",
                Value::Bool(true),
                "Places the per-channel edge handler in RAM, together with the sample \
                 computation and queue send inlined into it. The GPIO dispatch itself \
                 follows esp-hal's placement.",
            ),
        ],
        true,
    );
}
