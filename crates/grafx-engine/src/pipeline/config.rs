/// Registry configuration.
///
/// `dev_checks` enables warnings when the variables passed to a draw do not cover the
/// program's declared attributes and uniforms. `initial_viewport` sizes render targets
/// allocated before the first resize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    pub dev_checks: bool,
    pub initial_viewport: (u32, u32),
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            dev_checks: cfg!(debug_assertions),
            initial_viewport: (1280, 720),
        }
    }
}

pub const DEV_CHECKS_ENV: &str = "GRAFX_DEV_CHECKS";

impl RegistryConfig {
    /// Defaults, with `dev_checks` overridden by `GRAFX_DEV_CHECKS` when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(v) = std::env::var(DEV_CHECKS_ENV) {
            config.dev_checks = parse_flag(&v);
        }
        config
    }

    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.initial_viewport = (width, height);
        self
    }
}

fn parse_flag(v: &str) -> bool {
    let v = v.trim().to_ascii_lowercase();
    !(v.is_empty() || v == "0" || v == "false" || v == "no" || v == "off")
}
