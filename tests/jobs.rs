use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use migrapipe::error::Result;
use migrapipe::item::Item;
use migrapipe::jobs::{self, JobContext, NOT_FOUND, RENDER_BOTH, RENDER_NEW, RETRIEVE_FAIL};
use migrapipe::pipeline::config::{PipelineConfig, SkipPolicy};

mod common;
use common::{FakeService, VecFetcher};

fn context(dir: &Path) -> JobContext {
    JobContext::new(PipelineConfig {
        page_size: 2,
        concurrency: 4,
        report_dir: dir.to_path_buf(),
        ..PipelineConfig::default()
    })
}

fn read_yaml(path: impl AsRef<Path>) -> Result<BTreeMap<String, serde_yaml::Value>> {
    Ok(serde_yaml::from_str(&std::fs::read_to_string(path)?)?)
}

fn keys(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

fn row(key: &str, kind: &str, content: &str) -> Item<String> {
    Item::new(key, format!(r#"{{"type":"{kind}","q":"{content}"}}"#))
}

#[tokio::test]
async fn verify_sorts_every_failure_into_its_bucket() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let old = Arc::new(
        ["k1", "k3", "k4", "k5", "k6", "k7"]
            .iter()
            .fold(FakeService::new(), |svc, key| {
                svc.payload(key, "tex", &format!("c{}", &key[1..]))
            })
            .fail_retrieve("k3", 504, 1)
            .fail_retrieve("k4", 500, u32::MAX)
            .fail_render("k7", 500, u32::MAX),
    );
    let new = Arc::new(
        FakeService::new()
            .fail_check("c5", 400, u32::MAX)
            .fail_render("k6", 500, u32::MAX)
            .fail_render("k7", 404, u32::MAX),
    );

    let summary = jobs::verify(
        &context(dir.path()),
        keys(&["k1", "k2", "k3", "k4", "k5", "k6", "k7"]),
        old.clone(),
        new.clone(),
    )
    .await?;

    assert_eq!(summary.total, 7);
    assert_eq!(summary.successes, 2);
    for bucket in [NOT_FOUND, RETRIEVE_FAIL, "check", RENDER_NEW, RENDER_BOTH] {
        assert_eq!(summary.count(bucket), 1, "bucket {bucket}");
    }
    assert!(summary.reconciles());

    // 504 earns exactly one more retrieve; 404 on render earns one more try.
    assert_eq!(old.count("retrieve:k3"), 2);
    assert_eq!(old.count("retrieve:k2"), 1);
    assert_eq!(new.count("render:k7"), 2);
    assert_eq!(new.count("render:k6"), 1);
    assert_eq!(old.count("render:k6"), 1);
    assert_eq!(new.count("check:c4"), 0);

    let retrieve = read_yaml(dir.path().join("retrieve.yaml"))?;
    let not_found: Vec<String> = serde_yaml::from_value(retrieve[NOT_FOUND].clone())?;
    assert_eq!(not_found, vec!["k2"]);
    assert!(retrieve[RETRIEVE_FAIL]["k4"]["error"].is_string());

    let check = read_yaml(dir.path().join("check.yaml"))?;
    assert_eq!(check["check"]["k5"]["formula"], serde_yaml::Value::from("c5"));
    assert_eq!(check["check"]["k5"]["status"].as_u64(), Some(400));

    let rescued = read_yaml(dir.path().join("render_new.yaml"))?;
    assert_eq!(rescued[RENDER_NEW]["k6"]["status"].as_u64(), Some(500));

    let both = read_yaml(dir.path().join("render_both.yaml"))?;
    let record = &both[RENDER_BOTH]["k7"];
    assert_eq!(record["status"].as_u64(), Some(404));
    assert_eq!(
        record["fallback_error"],
        serde_yaml::Value::from("render failed for k7")
    );
    Ok(())
}

#[tokio::test]
async fn verify_with_no_keys_writes_empty_documents() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let summary = jobs::verify(
        &context(dir.path()),
        Vec::new(),
        Arc::new(FakeService::new()),
        Arc::new(FakeService::new()),
    )
    .await?;

    assert_eq!(summary.total, 0);
    assert!(summary.reconciles());
    let retrieve = read_yaml(dir.path().join("retrieve.yaml"))?;
    assert_eq!(retrieve.len(), 2);
    Ok(())
}

#[tokio::test]
async fn refresh_uses_generic_stage_buckets() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let service = Arc::new(
        FakeService::new()
            .payload("a", "tex", "x")
            .payload("b", "tex", "broken")
            .payload("d", "tex", "y")
            .fail_check("broken", 400, u32::MAX)
            .fail_render("d", 503, u32::MAX),
    );

    let summary = jobs::refresh(&context(dir.path()), keys(&["a", "b", "c", "d"]), service.clone())
        .await?;

    assert_eq!(summary.total, 4);
    assert_eq!(summary.successes, 1);
    assert_eq!(summary.count("retrieve_error"), 1);
    assert_eq!(summary.count("check_error"), 1);
    assert_eq!(summary.count("render_error"), 1);
    assert!(summary.reconciles());
    assert_eq!(service.count("render:a"), 1);
    assert_eq!(service.count("render:b"), 0);

    let doc = read_yaml(dir.path().join("refresh.yaml"))?;
    assert_eq!(doc["check_error"]["b"]["formula"], serde_yaml::Value::from("broken"));
    assert_eq!(doc["render_error"]["d"]["status"].as_u64(), Some(503));
    assert!(doc["retrieve_error"]["c"]["error"].is_string());
    Ok(())
}

#[tokio::test]
async fn rerender_renders_the_checked_resource() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let table = VecFetcher::new(vec![
        vec![row("r1", "tex", "one"), Item::new("r2", "not json".to_owned())],
        vec![row("r3", "tex", "bad")],
        vec![row("r4", "chem", "four")],
    ]);
    let service = Arc::new(
        FakeService::new()
            .fail_check("bad", 400, u32::MAX)
            .fail_render("res-four", 500, u32::MAX),
    );

    let ctx = JobContext::new(PipelineConfig {
        skip_policy: SkipPolicy::Record,
        ..context(dir.path()).config
    });
    let summary = jobs::rerender(&ctx, table, &(), None, service.clone()).await?;

    assert_eq!(summary.total, 4);
    assert_eq!(summary.successes, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.count("check_error"), 1);
    assert_eq!(summary.count("render_error"), 1);
    assert!(summary.reconciles());
    assert_eq!(service.count("render:res-one"), 1);
    assert!(!service.calls().iter().any(|call| call.contains("not json")));

    let doc = read_yaml(dir.path().join("rerender.yaml"))?;
    assert_eq!(
        doc["render_error"]["r4"]["resource"],
        serde_yaml::Value::from("res-four")
    );
    assert_eq!(doc["render_error"]["r4"]["type"], serde_yaml::Value::from("chem"));
    Ok(())
}

#[tokio::test]
async fn rerender_fails_checks_that_name_no_resource() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let table = VecFetcher::new(vec![vec![row("r1", "tex", "one")]]);
    let service = Arc::new(FakeService::new().unnamed_checks());

    let summary = jobs::rerender(&context(dir.path()), table, &(), None, service.clone()).await?;

    assert_eq!(summary.count("check_error"), 1);
    assert_eq!(service.count("render:res-one"), 0);
    Ok(())
}

#[cfg(feature = "ndjson")]
mod collect {
    use super::*;
    use migrapipe::jobs::CollectMode;
    use migrapipe::source::ndjson::NdjsonTable;

    fn table() -> NdjsonTable {
        NdjsonTable::open(format!("{}/mocks/table.ndjson", env!("CARGO_MANIFEST_DIR")))
    }

    #[tokio::test]
    async fn payloads_stream_to_output() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let output = dir.path().join("formulae.yaml");
        let summary = jobs::collect(
            &context(dir.path()),
            table(),
            &(),
            None,
            &output,
            CollectMode::Payload,
        )
        .await?;

        assert_eq!(summary.successes, 4);
        assert_eq!(summary.total, 4);

        let written = read_yaml(&output)?;
        assert_eq!(
            written.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["a1", "b2", "c3", "e5"]
        );
        assert_eq!(written["c3"]["q"], serde_yaml::Value::from("H2O"));
        assert_eq!(written["b2"]["q"], serde_yaml::Value::from("\\frac{1}{2}"));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn truncated_line_does_not_stop_the_run() -> Result<()> {
        use std::io::Write;

        let dir = tempfile::tempdir()?;
        let table_path = dir.path().join("table.ndjson");
        let mut file = std::fs::File::create(&table_path)?;
        writeln!(file, r#"{{"key":"a","value":"{{\"type\":\"tex\",\"q\":\"x\"}}"}}"#)?;
        writeln!(file, "{{truncated")?;
        writeln!(file, r#"{{"key":"b","value":"{{\"type\":\"tex\",\"q\":\"y\"}}"}}"#)?;
        drop(file);

        let service = Arc::new(FakeService::new());
        let before = tokio::time::Instant::now();
        let summary = jobs::rerender(
            &context(dir.path()),
            NdjsonTable::open(&table_path),
            &(),
            None,
            service.clone(),
        )
        .await?;

        assert_eq!(summary.successes, 2);
        assert!(summary.reconciles());
        assert_eq!(service.count("render:res-x"), 1);
        assert_eq!(service.count("render:res-y"), 1);
        assert!(dir.path().join("rerender.yaml").exists());
        assert_eq!(before.elapsed(), std::time::Duration::ZERO);
        Ok(())
    }

    #[tokio::test]
    async fn keys_only_marks_every_row() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let output = dir.path().join("keys.yaml");
        let summary = jobs::collect(
            &context(dir.path()),
            table(),
            &(),
            None,
            &output,
            CollectMode::KeysOnly,
        )
        .await?;

        assert_eq!(summary.successes, 5);
        let written = read_yaml(&output)?;
        assert_eq!(written.len(), 5);
        assert!(written.values().all(|value| value.as_u64() == Some(1)));
        Ok(())
    }
}
