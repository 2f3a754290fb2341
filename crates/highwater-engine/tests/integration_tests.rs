//! End-to-end tests for the incremental load pipeline
//!
//! The mock adapter serves as both source catalog and target warehouse, so
//! every scenario runs without credentials. The local JSON-lines connectors
//! cover the same flow against the filesystem.

mod fixtures;

use fixtures::{adapter, order_ids, orders, spec, target_table};
use highwater_catalog::{
    FetchError, LocalCatalog, LocalWarehouse, SourceCatalog, TableIdentifier, WarehouseAdapter,
};
use highwater_core::{RunStatus, Value, WatermarkOrigin, WatermarkPolicy};
use highwater_engine::{DeltaError, IncrementalLoad, JobRun, LoadError, LoadOptions, LoadSpec};
use pretty_assertions::assert_eq;

fn full_reload() -> LoadOptions {
    LoadOptions {
        on_watermark_error: WatermarkPolicy::FullReload,
        dry_run: false,
    }
}

#[tokio::test]
async fn appends_only_rows_above_the_watermark() {
    let adapter = adapter(&[98, 100, 101, 105], Some(&[100])).await;

    let outcome = IncrementalLoad::new(&adapter, &adapter, spec(), LoadOptions::default())
        .run()
        .await
        .unwrap();

    assert_eq!(outcome.watermark.watermark, Some(Value::Int(100)));
    assert_eq!(outcome.watermark.origin, WatermarkOrigin::Found);
    assert_eq!(outcome.counts.source_rows, 4);
    assert_eq!(outcome.counts.delta_rows, 2);
    assert_eq!(outcome.counts.written_rows, 2);
    assert_eq!(outcome.status, RunStatus::Appended);

    let target = adapter.table(&target_table()).await.unwrap();
    assert_eq!(order_ids(&target), vec![100, 101, 105]);
}

#[tokio::test]
async fn first_run_loads_the_whole_source() {
    let adapter = adapter(&[1, 2, 3], None).await;

    let outcome = IncrementalLoad::new(&adapter, &adapter, spec(), LoadOptions::default())
        .run()
        .await
        .unwrap();

    assert_eq!(outcome.watermark.origin, WatermarkOrigin::TargetMissing);
    assert_eq!(outcome.counts.written_rows, 3);
    assert_eq!(order_ids(&adapter.table(&target_table()).await.unwrap()), vec![1, 2, 3]);
}

#[tokio::test]
async fn empty_target_loads_the_whole_source() {
    let adapter = adapter(&[4, 5], Some(&[])).await;

    let outcome = IncrementalLoad::new(&adapter, &adapter, spec(), LoadOptions::default())
        .run()
        .await
        .unwrap();

    assert_eq!(outcome.watermark.origin, WatermarkOrigin::EmptyTarget);
    assert_eq!(outcome.counts.written_rows, 2);
}

#[tokio::test]
async fn empty_delta_never_calls_append() {
    let adapter = adapter(&[1, 2, 3], Some(&[3])).await;

    let outcome = IncrementalLoad::new(&adapter, &adapter, spec(), LoadOptions::default())
        .run()
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::NoNewData);
    assert_eq!(outcome.counts.delta_rows, 0);
    assert!(adapter.append_calls().await.is_empty());
    assert_eq!(adapter.row_count(&target_table()).await, 1);
}

#[tokio::test]
async fn empty_source_is_no_new_data() {
    let adapter = adapter(&[], None).await;

    let outcome = IncrementalLoad::new(&adapter, &adapter, spec(), LoadOptions::default())
        .run()
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::NoNewData);
    assert!(adapter.append_calls().await.is_empty());
    assert!(!adapter.has_table(&target_table()).await);
}

#[tokio::test]
async fn unreadable_target_aborts_by_default() {
    let adapter = adapter(&[1, 2, 3], Some(&[2])).await;
    adapter
        .add_error_for_table(target_table(), FetchError::NetworkError("connection refused".to_string()))
        .await;

    let err = IncrementalLoad::new(&adapter, &adapter, spec(), LoadOptions::default())
        .run()
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        LoadError::Watermark {
            source: FetchError::NetworkError(_),
            ..
        }
    ));
    assert!(adapter.append_calls().await.is_empty());
}

#[tokio::test]
async fn unreadable_target_reloads_everything_when_allowed() {
    let adapter = adapter(&[1, 2, 3], Some(&[2])).await;
    adapter
        .add_error_for_table(target_table(), FetchError::NetworkError("connection refused".to_string()))
        .await;

    let outcome = IncrementalLoad::new(&adapter, &adapter, spec(), full_reload())
        .run()
        .await
        .unwrap();

    assert!(matches!(outcome.watermark.origin, WatermarkOrigin::ReadFailed { .. }));
    assert_eq!(outcome.counts.delta_rows, 3);
    assert_eq!(outcome.counts.written_rows, 3);
}

#[tokio::test]
async fn full_reload_duplicates_rows_on_rerun() {
    // Append mode has no dedup: once the mark cannot be read, an unchanged
    // source is loaded a second time.
    let adapter = adapter(&[1, 2, 3], None).await;
    let load = IncrementalLoad::new(&adapter, &adapter, spec(), full_reload());

    load.run().await.unwrap();
    assert_eq!(adapter.row_count(&target_table()).await, 3);

    // A healthy re-run is a no-op
    let outcome = load.run().await.unwrap();
    assert_eq!(outcome.status, RunStatus::NoNewData);
    assert_eq!(adapter.row_count(&target_table()).await, 3);

    adapter
        .add_error_for_table(target_table(), FetchError::QueryError("warehouse suspended".to_string()))
        .await;
    load.run().await.unwrap();
    adapter.clear_errors().await;

    let target = adapter.table(&target_table()).await.unwrap();
    assert_eq!(order_ids(&target), vec![1, 2, 3, 1, 2, 3]);
}

#[tokio::test]
async fn dry_run_reports_without_writing() {
    let adapter = adapter(&[5, 6, 7], Some(&[5])).await;
    let options = LoadOptions {
        dry_run: true,
        ..LoadOptions::default()
    };

    let outcome = IncrementalLoad::new(&adapter, &adapter, spec(), options)
        .run()
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::DryRun);
    assert_eq!(outcome.counts.delta_rows, 2);
    assert_eq!(outcome.counts.written_rows, 0);
    assert!(adapter.append_calls().await.is_empty());
}

#[tokio::test]
async fn missing_source_table_fails() {
    let adapter = adapter(&[1], None).await;
    let spec = LoadSpec {
        source_table: TableIdentifier::catalog("sales", "returns"),
        ..spec()
    };

    let err = IncrementalLoad::new(&adapter, &adapter, spec, LoadOptions::default())
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, LoadError::Source { .. }));
}

#[tokio::test]
async fn incremental_column_missing_from_source_fails() {
    let adapter = adapter(&[1], None).await;
    let spec = LoadSpec {
        incremental_column: "updated_at".to_string(),
        ..spec()
    };

    let err = IncrementalLoad::new(&adapter, &adapter, spec, LoadOptions::default())
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, LoadError::Delta(DeltaError::MissingColumn { .. })));
}

#[tokio::test]
async fn write_failure_is_reported() {
    let adapter = adapter(&[1, 2], None).await;
    adapter
        .add_write_error_for_table(target_table(), FetchError::PermissionDenied("read-only role".to_string()))
        .await;

    let err = IncrementalLoad::new(&adapter, &adapter, spec(), LoadOptions::default())
        .run()
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        LoadError::Write {
            source: FetchError::PermissionDenied(_),
            ..
        }
    ));
}

#[tokio::test]
async fn commit_produces_report() {
    let adapter = adapter(&[10, 11, 12], Some(&[10])).await;
    let job = JobRun::init("orders_incremental");

    let outcome = IncrementalLoad::new(&adapter, &adapter, spec(), LoadOptions::default())
        .run()
        .await
        .unwrap();
    let report = job.commit(&spec(), outcome);

    assert_eq!(report.job_name, "orders_incremental");
    assert_eq!(report.source_table, "sales.orders");
    assert_eq!(report.target_table, "analytics.public.orders");
    assert_eq!(report.incremental_column, "order_id");
    assert_eq!(report.watermark, Some(Value::Int(10)));
    assert_eq!(report.counts.written_rows, 2);
    assert_eq!(report.status, RunStatus::Appended);
    assert!(report.started_at <= report.finished_at);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.json");
    report.save_to_file(&path).unwrap();
    assert_eq!(highwater_core::RunReport::load_from_file(&path).unwrap(), report);
}

#[tokio::test]
async fn local_connectors_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let catalog_root = dir.path().join("catalog");
    std::fs::create_dir_all(&catalog_root).unwrap();
    std::fs::write(
        catalog_root.join("catalog.toml"),
        r#"
[[tables]]
database = "sales"
name = "orders"
location = "orders.jsonl"
columns = [
    { name = "order_id", type = "int" },
    { name = "status", type = "string" },
]
"#,
    )
    .unwrap();
    let write_source = |ids: &[i64]| {
        let lines: Vec<String> = orders(ids)
            .to_json_rows()
            .iter()
            .map(|row| row.to_string())
            .collect();
        std::fs::write(catalog_root.join("orders.jsonl"), lines.join("\n")).unwrap();
    };

    let catalog = LocalCatalog::open(&catalog_root).unwrap();
    let warehouse = LocalWarehouse::new(dir.path().join("warehouse"));
    let load = IncrementalLoad::new(&catalog, &warehouse, spec(), LoadOptions::default());

    write_source(&[1, 2]);
    assert_eq!(load.run().await.unwrap().counts.written_rows, 2);

    write_source(&[1, 2, 3, 4]);
    let outcome = load.run().await.unwrap();
    assert_eq!(outcome.watermark.watermark, Some(Value::Int(2)));
    assert_eq!(outcome.counts.written_rows, 2);

    let outcome = load.run().await.unwrap();
    assert_eq!(outcome.status, RunStatus::NoNewData);

    assert_eq!(
        warehouse.max_value(&target_table(), "order_id").await.unwrap(),
        Some(Value::Int(4))
    );
    assert_eq!(catalog.read_table(&fixtures::source_table()).await.unwrap().len(), 4);
}
