//! High-water mark resolution against the target table
//!
//! A missing target and an empty target both mean "load everything". Any
//! other read failure is handled according to [`WatermarkPolicy`]: abort the
//! run, or downgrade to a full reload and say so in the log and the report.

use highwater_catalog::{FetchError, TableIdentifier, WarehouseAdapter};
use highwater_core::{Value, WatermarkOrigin, WatermarkPolicy};

/// The mark a run filters against and how it was obtained
#[derive(Debug, Clone, PartialEq)]
pub struct WatermarkResolution {
    /// Exclusive lower bound for the delta; `None` means full load
    pub watermark: Option<Value>,

    pub origin: WatermarkOrigin,
}

impl WatermarkResolution {
    pub fn is_full_load(&self) -> bool {
        self.watermark.is_none()
    }
}

/// Query `MAX(column)` on the target and classify the outcome
pub async fn resolve_watermark(
    adapter: &dyn WarehouseAdapter,
    table: &TableIdentifier,
    column: &str,
    policy: WatermarkPolicy,
) -> Result<WatermarkResolution, FetchError> {
    let resolution = match adapter.max_value(table, column).await {
        Ok(Some(value)) if !value.is_null() => WatermarkResolution {
            watermark: Some(value),
            origin: WatermarkOrigin::Found,
        },
        Ok(_) => {
            tracing::info!(target_table = %table, column, "target holds no values, loading everything");
            WatermarkResolution {
                watermark: None,
                origin: WatermarkOrigin::EmptyTarget,
            }
        }
        Err(err) if err.is_not_found() => {
            tracing::info!(target_table = %table, "target table does not exist yet, loading everything");
            WatermarkResolution {
                watermark: None,
                origin: WatermarkOrigin::TargetMissing,
            }
        }
        Err(err) => match policy {
            WatermarkPolicy::Abort => return Err(err),
            WatermarkPolicy::FullReload => {
                tracing::warn!(
                    target_table = %table,
                    adapter = adapter.name(),
                    error = %err,
                    "could not read high-water mark, falling back to a full reload"
                );
                WatermarkResolution {
                    watermark: None,
                    origin: WatermarkOrigin::ReadFailed {
                        reason: err.to_string(),
                    },
                }
            }
        },
    };

    if let Some(mark) = &resolution.watermark {
        tracing::info!(target_table = %table, column, watermark = %mark, "resolved high-water mark");
    }

    Ok(resolution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use highwater_catalog::MockAdapter;
    use highwater_core::{Column, LogicalType, RecordSet, Schema};

    fn target() -> TableIdentifier {
        TableIdentifier::bare("orders")
    }

    fn ids(values: &[Option<i64>]) -> RecordSet {
        let schema = Schema::from_columns(vec![Column::new("id", LogicalType::Int)]);
        let rows = values.iter().map(|v| vec![Value::from(*v)]).collect();
        RecordSet::new(schema, rows).unwrap()
    }

    #[tokio::test]
    async fn found() {
        let adapter = MockAdapter::new();
        adapter.add_table(target(), ids(&[Some(3), None, Some(7)])).await;

        let resolution = resolve_watermark(&adapter, &target(), "id", WatermarkPolicy::Abort)
            .await
            .unwrap();

        assert_eq!(resolution.watermark, Some(Value::Int(7)));
        assert_eq!(resolution.origin, WatermarkOrigin::Found);
        assert!(!resolution.is_full_load());
    }

    #[tokio::test]
    async fn zero_is_a_real_watermark() {
        let adapter = MockAdapter::new();
        adapter.add_table(target(), ids(&[Some(0)])).await;

        let resolution = resolve_watermark(&adapter, &target(), "id", WatermarkPolicy::Abort)
            .await
            .unwrap();

        assert_eq!(resolution.watermark, Some(Value::Int(0)));
    }

    #[tokio::test]
    async fn empty_and_all_null_targets() {
        let adapter = MockAdapter::new();
        adapter.add_table(target(), ids(&[None, None])).await;

        let resolution = resolve_watermark(&adapter, &target(), "id", WatermarkPolicy::Abort)
            .await
            .unwrap();

        assert_eq!(resolution.origin, WatermarkOrigin::EmptyTarget);
        assert!(resolution.is_full_load());
    }

    #[tokio::test]
    async fn missing_target_is_a_full_load_under_any_policy() {
        let adapter = MockAdapter::new();

        for policy in [WatermarkPolicy::Abort, WatermarkPolicy::FullReload] {
            let resolution = resolve_watermark(&adapter, &target(), "id", policy).await.unwrap();
            assert_eq!(resolution.origin, WatermarkOrigin::TargetMissing);
            assert!(resolution.is_full_load());
        }
    }

    #[tokio::test]
    async fn read_failure_follows_policy() {
        let adapter = MockAdapter::new();
        adapter.add_table(target(), ids(&[Some(1)])).await;
        adapter
            .add_error_for_table(target(), FetchError::AuthenticationError("token expired".to_string()))
            .await;

        let err = resolve_watermark(&adapter, &target(), "id", WatermarkPolicy::Abort)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::AuthenticationError(_)));

        let resolution = resolve_watermark(&adapter, &target(), "id", WatermarkPolicy::FullReload)
            .await
            .unwrap();
        assert!(resolution.is_full_load());
        match resolution.origin {
            WatermarkOrigin::ReadFailed { reason } => assert!(reason.contains("token expired")),
            other => panic!("unexpected origin {:?}", other),
        }
    }

    #[tokio::test]
    async fn unknown_target_column_is_a_read_failure() {
        let adapter = MockAdapter::new();
        adapter.add_table(target(), ids(&[Some(1)])).await;

        let err = resolve_watermark(&adapter, &target(), "updated_at", WatermarkPolicy::Abort)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::QueryError(_)));
    }
}
