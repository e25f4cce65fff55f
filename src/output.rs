use std::sync::OnceLock;

static QUIET: OnceLock<bool> = OnceLock::new();

/// Banners and summaries are suppressed when `DATA_MANAGER_QUIET` is set
pub fn is_quiet() -> bool {
    *QUIET.get_or_init(|| {
        std::env::var("DATA_MANAGER_QUIET")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    })
}
