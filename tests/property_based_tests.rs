//! # Property-Based Tests
//!
//! Invariants of template rendering, progress math and ledger completion that
//! must hold for arbitrary inputs.

mod common;

use chrono::Utc;
use proptest::prelude::*;
use serde_json::{json, Value};

use bulkgen::ledger::{BatchStore, InMemoryStore, RowLedger, RowUpdate, RowUpdateOutcome};
use bulkgen::models::{Batch, BatchId, NewBatch, RowId};
use bulkgen::orchestration::progress::percent;
use bulkgen::template;
use common::*;

proptest! {
    #[test]
    fn literal_templates_render_unchanged(text in literal_text_strategy(), row in row_strategy()) {
        prop_assert_eq!(template::render(&text, &row), text);
    }

    #[test]
    fn present_fields_leave_no_placeholders(
        row in row_strategy(),
        prefix in literal_text_strategy(),
    ) {
        prop_assume!(row.values().all(|value| !template::stringify(value).contains('{')));
        let template: String = row
            .keys()
            .map(|name| format!("{prefix}{{{{{name}}}}}"))
            .collect();

        let rendered = template::render(&template, &row);

        for name in row.keys() {
            let placeholder = format!("{{{{{}}}}}", name);
            prop_assert!(!rendered.contains(&placeholder), "{} left in {}", placeholder, rendered);
        }
        prop_assert!(template::missing_fields(&template, &row).is_empty());
    }

    #[test]
    fn stray_braces_around_a_placeholder_stay_literal(
        name in field_name_strategy(),
        value in field_value_strategy(),
        noise in "[a-z ]{0,8}",
    ) {
        let mut row = serde_json::Map::new();
        row.insert(name.clone(), value.clone());
        let text = template::stringify(&value);

        prop_assert_eq!(
            template::render(&format!("{{{{{{{name}}}}}}}"), &row),
            format!("{{{text}}}")
        );
        prop_assert_eq!(
            template::render(&format!("{{{{{noise} {{{{{name}}}}}"), &row),
            format!("{{{{{noise} {text}")
        );
    }

    #[test]
    fn absent_fields_are_kept_verbatim(name in field_name_strategy(), row in row_strategy()) {
        prop_assume!(!row.contains_key(&name));
        let template = format!("Hello {{{{{name}}}}}!");

        prop_assert_eq!(template::render(&template, &row), template.clone());
        prop_assert_eq!(template::missing_fields(&template, &row), vec![name.as_str()]);
    }

    #[test]
    fn percent_is_monotone_and_reaches_100_only_when_complete(total in 1usize..5_000) {
        let mut previous = 0u8;
        for processed in 0..=total {
            let current = percent(processed, total);
            prop_assert!(current >= previous);
            prop_assert_eq!(current == 100, processed == total);
            previous = current;
        }
    }

    #[test]
    fn exactly_one_update_completes_the_batch((total, order) in completion_order_strategy()) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let store = InMemoryStore::new();
            let batch_id = BatchId::new();
            let rows: Vec<Value> = (0..total).map(|i| json!({"n": i})).collect();
            let request = NewBatch::new("Item {{n}}", rows.clone());
            store
                .insert_batch(&Batch::new_pending(batch_id, &request, total, Utc::now()))
                .await
                .unwrap();
            let inputs = rows
                .into_iter()
                .map(|row| row.as_object().cloned().unwrap())
                .collect();
            store.mark_pending(batch_id, inputs).await.unwrap();

            let mut completions = Vec::new();
            for (position, offset) in order.iter().enumerate() {
                let update = if offset % 4 == 3 {
                    RowUpdate::error("boom")
                } else {
                    RowUpdate::success("ok")
                };
                let outcome = store
                    .update_row(batch_id, &RowId::new(batch_id, *offset), update.clone())
                    .await
                    .unwrap();
                if outcome.completed_batch(&update) {
                    completions.push((position, outcome));
                }

                // Duplicate deliveries never change anything
                let replay = store
                    .update_row(batch_id, &RowId::new(batch_id, *offset), RowUpdate::success("late"))
                    .await
                    .unwrap();
                assert!(matches!(replay, RowUpdateOutcome::Unchanged { .. }));
            }

            let expected_errors = (0..total).filter(|offset| offset % 4 == 3).count();
            assert_eq!(
                completions,
                vec![(
                    total - 1,
                    RowUpdateOutcome::Applied { remaining: 0, error_rows: expected_errors }
                )]
            );

            let counts = store.row_counts(batch_id).await.unwrap();
            assert!(counts.all_terminal());
            assert_eq!(counts.failed, expected_errors);
        });
    }
}

#[test]
fn stringify_matches_render_for_scalar_values() {
    let row = json!({"s": "text", "n": 4, "b": false, "z": null})
        .as_object()
        .cloned()
        .unwrap();
    let rendered = template::render("{{s}}|{{n}}|{{b}}|{{z}}", &row);
    let expected: Vec<String> = ["s", "n", "b", "z"]
        .iter()
        .map(|key| template::stringify(row.get(*key).unwrap_or(&Value::Null)))
        .collect();
    assert_eq!(rendered, expected.join("|"));
}
