use tracing::{error, info, warn};

use crate::cancel::CancellationToken;
use crate::config::{Config, SourceDescriptor};
use crate::db::Operator;
use crate::errors::{Error, PopulateError};
use crate::fetch::Fetcher;
use crate::hierarchy::HierarchyBuilder;
use crate::index::IndexWriter;
use crate::metadata::SourceMetadataWriter;
use crate::names::NameIngestor;
use crate::parser::NameParser;
use crate::progress::ProgressReporter;
use crate::vernacular::VernacularIngestor;

/// The outcome of one populate run: which sources reached `DONE`, which
/// reached `FAILED` (spec §4.9).
#[derive(Debug, Clone, Default)]
pub struct PopulateSummary {
    pub succeeded: Vec<i32>,
    pub failed: Vec<i32>,
}

impl PopulateSummary {
    /// Whether every configured source failed -- the one condition that
    /// turns per-source isolation into a whole-run failure (spec §4.9 /
    /// `PopulateError::AllSourcesFailed`).
    pub fn all_failed(&self) -> bool {
        self.succeeded.is_empty() && !self.failed.is_empty()
    }
}

/// Wraps a phase failure as a per-source `PopulateError::Write`, except for
/// cancellation, which spec §7 says "propagates immediately" rather than
/// being treated as a per-source failure -- wrapping it here would turn it
/// into an ordinary `FAILED` source in `run`'s `match`.
fn phase_err(source_id: i32, phase: &'static str, cause: Error) -> Error {
    if matches!(cause, Error::Cancelled) {
        return cause;
    }

    PopulateError::Write {
        source_id,
        phase,
        cause: Box::new(cause),
    }
    .into()
}

/// The Populate Orchestrator (spec §4.9). Drives each configured source
/// through `INIT → FETCH → NAMES → HIERARCHY → INDICES → VERNACULARS →
/// METADATA → DONE`, isolating a failing source from the rest of the run.
pub struct PopulateOrchestrator<'a> {
    operator: &'a Operator,
    parser: &'a dyn NameParser,
}

impl<'a> PopulateOrchestrator<'a> {
    pub fn new(operator: &'a Operator, parser: &'a dyn NameParser) -> PopulateOrchestrator<'a> {
        PopulateOrchestrator { operator, parser }
    }

    /// Runs populate for every source `config` selects. The single-source
    /// constraint for `releaseVersion`/`releaseDate` overrides is already
    /// enforced by [`Config::validated`] at construction time, so nothing
    /// here can observe an invalid combination (spec §4.9: "violations are
    /// rejected before any fetch begins").
    pub fn run(&self, config: &Config, cancel: &CancellationToken, progress: &ProgressReporter) -> Result<PopulateSummary, Error> {
        self.operator.require_schema()?;

        let cache_dir = config.cache_dir();
        let fetcher = Fetcher::new(&cache_dir);

        let mut summary = PopulateSummary::default();

        for source in config.selected_sources() {
            cancel.check()?;

            match self.run_one(source, config, &fetcher, cancel, progress) {
                Ok(()) => {
                    info!(source_id = source.id, "source reached DONE");
                    summary.succeeded.push(source.id);
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(err) => {
                    error!(source_id = source.id, error = %err, "source reached FAILED, continuing with next source");
                    summary.failed.push(source.id);
                }
            }
        }

        if summary.all_failed() {
            return Err(PopulateError::AllSourcesFailed.into());
        }
        if !summary.failed.is_empty() {
            warn!(
                succeeded = summary.succeeded.len(),
                failed = summary.failed.len(),
                "populate run finished with partial failures"
            );
        }

        Ok(summary)
    }

    fn run_one(
        &self,
        source: &SourceDescriptor,
        config: &Config,
        fetcher: &Fetcher,
        cancel: &CancellationToken,
        progress: &ProgressReporter,
    ) -> Result<(), Error> {
        cancel.check()?;

        let (archive, parsed_filename) = fetcher.fetch(source.id, &source.parent).map_err(|err| match err {
            Error::Fetch(cause) => PopulateError::Fetch { source_id: source.id, cause }.into(),
            other => phase_err(source.id, "fetch", other),
        })?;

        let name_ingestor = NameIngestor::new(self.operator, config.database.batch_size);
        name_ingestor
            .ingest(&archive, cancel, progress)
            .map_err(|err| phase_err(source.id, "names", err))?;

        let hierarchy_builder = HierarchyBuilder::new(self.parser, config.runtime.jobs_number);
        let hierarchy = hierarchy_builder.build(&archive, cancel).map_err(|err| phase_err(source.id, "hierarchy", err))?;

        let index_writer = IndexWriter::new(
            self.operator,
            &hierarchy,
            config.database.batch_size,
            config.populate.with_flat_classification,
        );
        index_writer
            .write(source.id, &archive, cancel, progress)
            .map_err(|err| phase_err(source.id, "indices", err))?;

        let vernacular_ingestor = VernacularIngestor::new(self.operator, config.database.batch_size);
        vernacular_ingestor
            .ingest(source.id, &archive, cancel, progress)
            .map_err(|err| phase_err(source.id, "vernaculars", err))?;

        let sfga_metadata = archive.metadata().map_err(|err| phase_err(source.id, "metadata", err))?;

        let metadata_writer = SourceMetadataWriter::new(self.operator);
        metadata_writer
            .write(
                source,
                sfga_metadata.as_ref(),
                parsed_filename.as_ref(),
                config.populate.release_version.as_deref(),
                config.populate.release_date.as_deref(),
            )
            .map_err(|err| phase_err(source.id, "metadata", err))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_with_only_failures_is_all_failed() {
        let summary = PopulateSummary {
            succeeded: vec![],
            failed: vec![1, 2],
        };
        assert!(summary.all_failed());
    }

    #[test]
    fn summary_with_one_success_is_not_all_failed() {
        let summary = PopulateSummary {
            succeeded: vec![1],
            failed: vec![2],
        };
        assert!(!summary.all_failed());
    }

    #[test]
    fn summary_with_no_sources_at_all_is_not_all_failed() {
        let summary = PopulateSummary::default();
        assert!(!summary.all_failed());
    }

    #[test]
    fn phase_err_wraps_the_cause_and_tags_the_phase() {
        let wrapped = phase_err(7, "names", Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "boom")));
        match wrapped {
            Error::Populate(PopulateError::Write { source_id, phase, .. }) => {
                assert_eq!(source_id, 7);
                assert_eq!(phase, "names");
            }
            other => panic!("expected PopulateError::Write, got {other:?}"),
        }
    }

    #[test]
    fn phase_err_passes_cancellation_through_unwrapped() {
        let wrapped = phase_err(7, "names", Error::Cancelled);
        assert!(matches!(wrapped, Error::Cancelled));
    }
}
