//! Build script for rulesplice
//!
//! Embeds build-time information (git commit, dirty status, build timestamp)
//! used by `rulesplice --version`.

fn main() {
    shadow_rs::ShadowBuilder::builder()
        .build()
        .expect("Failed to generate build info");
}
