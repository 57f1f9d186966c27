use std::path::PathBuf;

/// Top level error for the populate + optimize pipeline.
///
/// Every variant carries a stable, matchable shape so callers (the excluded
/// CLI wrapper, a future service) can decide exit codes without parsing
/// strings.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("could not connect to the database")]
    Connection(#[from] ConnectionError),

    #[error("database schema is missing or incompatible")]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Populate(#[from] PopulateError),

    #[error("optimize step failed")]
    Optimize(#[from] OptimizeError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parsing(#[from] ParseError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error("the run was cancelled")]
    Cancelled,

    #[error("an error occurred with the database")]
    Database(#[from] diesel::result::Error),

    #[error("an error occurred getting a database connection")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum ConnectionError {
    #[error("failed to build connection pool: {0}")]
    PoolBuild(String),

    #[error("ping failed: {0}")]
    PingFailed(String),
}

#[derive(thiserror::Error, Debug)]
pub enum SchemaError {
    #[error("required table `{0}` is missing; run schema creation before populate")]
    TableMissing(String),

    #[error("database has no tables at all")]
    Empty,
}

/// Errors that abort a single source without aborting the whole run.
/// See spec §4.9 / §7 "Per-source populate".
#[derive(thiserror::Error, Debug)]
pub enum PopulateError {
    #[error("source {source_id}: fetch failed")]
    Fetch {
        source_id: i32,
        #[source]
        cause: FetchError,
    },

    #[error("source {source_id}: write failed at phase {phase}")]
    Write {
        source_id: i32,
        phase: &'static str,
        #[source]
        cause: Box<Error>,
    },

    #[error("every configured source failed to populate")]
    AllSourcesFailed,
}

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("archive not found for source {0}")]
    NotFound(i32),

    #[error("could not read archive: {0}")]
    Read(String),

    #[error("archive does not advertise a SFGA schema version")]
    VersionMissing,

    #[error("SFGA schema version {found} is older than the minimum supported version {minimum}")]
    VersionTooOld { found: u32, minimum: u32 },

    #[error("unexpected path while resolving archive: {0}")]
    Path(PathBuf),
}

#[derive(thiserror::Error, Debug)]
pub enum OptimizeError {
    #[error("reparse step failed: {0}")]
    Reparse(String),

    #[error("vernacular language normalization failed: {0}")]
    VernacularNormalize(String),

    #[error("orphan removal failed: {0}")]
    RemoveOrphans(String),

    #[error("word index build failed: {0}")]
    WordIndex(String),

    #[error("verification view rebuild failed: {0}")]
    VerificationView(String),

    #[error("vacuum/analyze failed: {0}")]
    VacuumAnalyze(String),
}

#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("invalid archive filename: {0}")]
    Filename(String),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    DateFormat(#[from] chrono::ParseError),
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("releaseVersion/releaseDate override requires exactly one selected source, got {0}")]
    OverrideRequiresSingleSource(usize),
}

#[derive(thiserror::Error, Debug)]
pub enum LookupError {
    #[error("data source {0} not found")]
    DataSource(i32),
}
