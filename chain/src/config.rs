use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct ChainConfig {
    /// Directory holding the chain's durable state.
    pub data_dir: PathBuf,
    /// Write-ahead log file name inside `data_dir`.
    pub wal_file: String,
    /// How many historical elements `verify_chain` re-proves per run.
    /// 0 means the full set.
    pub verify_sample: usize,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("scar-data"),
            wal_file: "chain.wal".to_string(),
            verify_sample: 8,
        }
    }
}

impl ChainConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join(&self.wal_file)
    }
}
