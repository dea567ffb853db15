//! CLI configuration

#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the redeployer service
    pub url: String,
}
