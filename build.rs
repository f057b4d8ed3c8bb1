use std::env;
use std::fs;
use std::path::Path;

fn main() {
    // Render the default config template so the crate can embed it
    let out_dir = env::var("OUT_DIR").unwrap_or_else(|_| "./".to_string());
    let template_path = Path::new(&out_dir).join("config.template.toml");

    let template = r#"# hwvdec configuration template
# Copy this file to 'hwvdec.toml' next to the player binary and adjust.
# Every key can also be set through the environment, e.g. HWVDEC_SYSFS_ROOT.

# Root of the kernel control surfaces (tsync/, video/)
sysfs_root = "/sys/class"

# Consecutive would-block writes tolerated before a decoder reset is forced
blocked_write_threshold = 50

# Drift (seconds) between decoder output clock and player clock before correction
clock_correction_threshold = 0.20

# Sleep after a would-block write, in milliseconds
write_retry_wait_ms = 20

# Bounded wait for a new decoded picture inside decode, in milliseconds
picture_wait_ms = 100

# Background poller idle sleep, in milliseconds
poll_idle_wait_ms = 10

# Bounded join of the background poller on close, in milliseconds
poller_join_timeout_ms = 500

# Buffered-duration water marks, in seconds
low_water_secs = 1.0
high_water_secs = 2.0

# Decoder ring buffer capacity assumed until the decoder reports one, in bytes
default_vbuf_size = 1000000
"#;

    let _ = fs::write(template_path, template);
    println!("cargo:rerun-if-changed=build.rs");
}
