//! Batch driver: one transformer over every matched pair of a source directory

use std::collections::BTreeSet;
use std::path::PathBuf;

use super::{DriveOutcome, DriveSettings, DriveTransformer, OnePlus, SummaryReport, TransformDrive, Waylens};
use crate::blobstore::{BlobStore, LocalBlobStore, push_tree};
use crate::config::{Hardware, TransformOptions};
use crate::error::{Result, TransformError};
use crate::layout::FileSystemLayout;
use crate::pairing::{DrivePair, pair_sources};
use crate::records::{RecordGraph, RecordKind};
use crate::schema::SchemaRegistry;
use crate::tables::{save_table, to_rows, validate_rows};
use crate::video::VideoTool;

/// What a batch run produced.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub summary: SummaryReport,
    /// Source videos of abandoned drives.
    pub failed: Vec<PathBuf>,
    /// Files pushed to the blob store.
    pub pushed: usize,
}

pub struct BatchTransformer<'a> {
    transformer: &'a dyn TransformDrive,
    registry: &'a SchemaRegistry,
    store: Option<&'a dyn BlobStore>,
}

impl<'a> BatchTransformer<'a> {
    pub fn new(
        transformer: &'a dyn TransformDrive,
        registry: &'a SchemaRegistry,
        store: Option<&'a dyn BlobStore>,
    ) -> Self {
        Self { transformer, registry, store }
    }

    /// Transforms every pair in order.
    ///
    /// A drive that fails for its own reasons is logged and skipped; the
    /// first fatal error stops the batch.
    pub fn run(&self, pairs: &[DrivePair]) -> Result<BatchReport> {
        let mut graph = RecordGraph::new();
        let mut report = BatchReport::default();
        let mut touched = BTreeSet::new();

        for pair in pairs {
            let span = tracing::info_span!("drive", source = %pair.video.display());
            let _enter = span.enter();

            let result = self
                .transformer
                .transform(&mut graph, pair)
                .and_then(|outcome| self.refresh_diary(&mut graph, &outcome).map(|dir| (outcome, dir)));
            match result {
                Ok((outcome, diary_dir)) => {
                    touched.insert(diary_dir);
                    report.summary.push(outcome.summary);
                }
                Err(e) if e.is_recoverable() => {
                    tracing::error!(error = %e, telemetry = %pair.telemetry.display(), "drive abandoned");
                    report.failed.push(pair.video.clone());
                }
                Err(e) => return Err(e),
            }
            graph.reset_drive_records();
        }

        if let Some(store) = self.store {
            let root = self.transformer.layout().root();
            for dir in &touched {
                match push_tree(store, root, dir) {
                    Ok(n) => report.pushed += n,
                    Err(e) => tracing::error!(dir = %dir.display(), error = %e, "push failed"),
                }
            }
            tracing::info!(files = report.pushed, diaries = touched.len(), "pushed output");
        }

        tracing::info!(done = report.summary.rows().len(), failed = report.failed.len(), "batch finished");
        Ok(report)
    }

    /// Rewrites the diary table of `outcome`'s diary so it lists exactly the
    /// drives finished so far. Returns the diary directory.
    fn refresh_diary(&self, graph: &mut RecordGraph, outcome: &DriveOutcome) -> Result<PathBuf> {
        let layout = self.transformer.layout();
        let vehicle = &self.transformer.settings().vehicle_id;
        let vehicle_dir = layout.vehicle_dir(&outcome.diary_date, &outcome.diary, vehicle);

        let json = self.transformer.settings().json_dump;
        let written = to_rows([graph.diary(&outcome.diary)?]).and_then(|rows| {
            let rows = validate_rows(self.registry, RecordKind::Diary, &rows)?;
            std::fs::create_dir_all(&vehicle_dir).map_err(|e| TransformError::io(&vehicle_dir, e))?;
            save_table(self.registry, &vehicle_dir, RecordKind::Diary, &rows, json)
        });
        if let Err(e) = written {
            graph.withdraw_drive(&outcome.diary, &outcome.drive)?;
            return Err(e);
        }
        Ok(layout.diary_dir(&outcome.diary_date, &outcome.diary))
    }
}

/// Runs a whole `transform` invocation: loads the schemas, pairs the
/// sources and drives the batch with the transformer for `options.hardware`.
pub fn run_batch(options: &TransformOptions, tool: &dyn VideoTool) -> Result<BatchReport> {
    options.check()?;
    let registry = SchemaRegistry::load(&options.schema_dir)?;

    if options.hardware == Hardware::Zed {
        tracing::warn!(hardware = %options.hardware, "source not supported yet");
        return Ok(BatchReport::default());
    }

    let pairs = pair_sources(&options.source_dir, options.hardware)?;
    tracing::info!(drives = pairs.len(), source = %options.source_dir.display(), "matched sources");

    std::fs::create_dir_all(&options.dest_dir).map_err(|e| TransformError::io(&options.dest_dir, e))?;
    let layout = FileSystemLayout::new(&options.dest_dir);
    let settings = DriveSettings {
        vehicle_id: options.vehicle_id.clone(),
        location: options.location.clone(),
        chunk_size_sec: options.chunk_size_sec,
        show_progress: options.show_progress,
        json_dump: options.json_dump,
    };

    let store = match &options.push_to {
        Some(dir) => Some(LocalBlobStore::new(dir).map_err(|e| TransformError::io(dir, e))?),
        None => None,
    };

    let transformer: Box<dyn TransformDrive + '_> = match options.hardware {
        Hardware::OnePlus => Box::new(DriveTransformer::new(OnePlus::new(), tool, &registry, layout, settings)),
        _ => Box::new(DriveTransformer::new(Waylens::new(), tool, &registry, layout, settings)),
    };
    let batch = BatchTransformer::new(transformer.as_ref(), &registry, store.as_ref().map(|s| s as &dyn BlobStore));
    batch.run(&pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{GraphError, Token};
    use crate::transform::DriveSummary;
    use std::path::Path;

    struct StubDrive {
        layout: FileSystemLayout,
        settings: DriveSettings,
    }

    impl TransformDrive for StubDrive {
        fn transform(&self, graph: &mut RecordGraph, pair: &DrivePair) -> Result<DriveOutcome> {
            let diary = graph.add_diary("2019-06-13", "sally", "log.csv", "Berlin")?;
            let drive = graph.add_drive(&diary, false)?;
            match pair.prefix.as_str() {
                "broken" => {
                    graph.withdraw_drive(&diary, &drive)?;
                    Err(TransformError::Drive("no start time".into()))
                }
                "invariant" => Err(GraphError::DataAlreadyAssigned(Token::from("e")).into()),
                _ => Ok(DriveOutcome {
                    diary: diary.clone(),
                    diary_date: "2019-06-13".into(),
                    drive: drive.clone(),
                    drive_dir: self.layout.drive_dir("2019-06-13", &diary, "sally", &drive),
                    segments: vec![],
                    summary: DriveSummary {
                        vehicle: "sally".into(),
                        date: "2019-06-13".into(),
                        diary_token: diary.to_string(),
                        drive_token: drive.to_string(),
                        sequences: 1,
                        distance_km: 0.5,
                        duration_sec: 60.0,
                        segment_mismatches: 0,
                    },
                }),
            }
        }

        fn layout(&self) -> &FileSystemLayout {
            &self.layout
        }

        fn settings(&self) -> &DriveSettings {
            &self.settings
        }
    }

    fn stub(root: &Path) -> StubDrive {
        StubDrive {
            layout: FileSystemLayout::new(root),
            settings: DriveSettings {
                vehicle_id: "sally".into(),
                location: "Berlin".into(),
                chunk_size_sec: 60.0,
                show_progress: false,
                json_dump: false,
            },
        }
    }

    fn pair(prefix: &str) -> DrivePair {
        DrivePair {
            prefix: prefix.into(),
            video: PathBuf::from(format!("{prefix}.mp4")),
            telemetry: PathBuf::from(format!("{prefix}.csv")),
        }
    }

    fn registry() -> SchemaRegistry {
        SchemaRegistry::load(&Path::new(env!("CARGO_MANIFEST_DIR")).join("schemas")).unwrap()
    }

    #[test]
    fn failed_drive_is_skipped_and_left_out_of_the_diary() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = registry();
        let drive = stub(tmp.path());
        let batch = BatchTransformer::new(&drive, &registry, None);

        let report = batch.run(&[pair("a"), pair("broken"), pair("b")]).unwrap();
        assert_eq!(report.summary.rows().len(), 2);
        assert_eq!(report.failed, vec![PathBuf::from("broken.mp4")]);

        let diary = &report.summary.rows()[0].diary_token;
        let diary_file = tmp.path().join(format!("2019-06-13_{diary}/vehicle_sally/drive_diary.avro"));
        let rows = crate::tables::to_json(&crate::tables::read_table(&diary_file).unwrap()).unwrap();
        let drives = rows[0]["drive_tokens"].as_array().unwrap();
        assert_eq!(drives.len(), 2);
        assert!(drives.iter().all(|t| report.summary.rows().iter().any(|s| s.drive_token == t.as_str().unwrap())));
    }

    #[test]
    fn invariant_violation_stops_the_batch() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = registry();
        let drive = stub(tmp.path());
        let batch = BatchTransformer::new(&drive, &registry, None);

        let err = batch.run(&[pair("a"), pair("invariant"), pair("b")]).unwrap_err();
        assert!(!err.is_recoverable());
    }

    #[test]
    fn touched_diaries_are_pushed() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = registry();
        let drive = stub(&tmp.path().join("out"));
        let store = LocalBlobStore::new(tmp.path().join("store")).unwrap();
        let batch = BatchTransformer::new(&drive, &registry, Some(&store));

        let report = batch.run(&[pair("a")]).unwrap();
        assert_eq!(report.pushed, 1);
        let keys = store.list("").unwrap();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].ends_with("vehicle_sally/drive_diary.avro"));
    }
}
