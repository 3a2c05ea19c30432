use std::{fmt, path::Path, path::PathBuf};

/// The source image path does not resolve to a file.
#[derive(Debug)]
pub(crate) struct SourceNotFound(pub PathBuf);

impl fmt::Display for SourceNotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "specified file doesn't exist: {}", self.0.display())
    }
}

impl std::error::Error for SourceNotFound {}

pub(crate) trait AnyhowExt<T> {
    fn anyhow(self) -> Result<T, anyhow::Error>;
    fn anyhow_at(self, action: &str, path: &Path) -> Result<T, anyhow::Error>;
}

impl<T, E> AnyhowExt<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn anyhow(self) -> Result<T, anyhow::Error> {
        self.map_err(anyhow::Error::from)
    }

    fn anyhow_at(self, action: &str, path: &Path) -> Result<T, anyhow::Error> {
        self.map_err(|e| anyhow::Error::from(e).context(format!("failed to {} {}", action, path.display())))
    }
}
