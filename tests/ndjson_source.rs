#![cfg(feature = "ndjson")]

use std::io::Write;
use std::time::Duration;

use migrapipe::error::{Error, Result};
use migrapipe::item::{Cursor, Item};
use migrapipe::remote::Payload;
use migrapipe::source::ndjson::NdjsonTable;
use migrapipe::source::paged::{handler_fn, PagedSource};

fn mock_path() -> String {
    format!("{}/mocks/table.ndjson", env!("CARGO_MANIFEST_DIR"))
}

async fn page_keys(source: &PagedSource<NdjsonTable>) -> Result<Vec<Vec<String>>> {
    let mut pages = source.pages(&(), None);
    let mut out = Vec::new();
    while let Some(page) = pages.next_page().await? {
        out.push(page.rows().iter().map(|row| row.key().to_owned()).collect());
    }
    Ok(out)
}

#[tokio::test]
async fn reads_mock_table_in_pages() -> Result<()> {
    let source = PagedSource::new(NdjsonTable::open(mock_path())).page_size(2);
    assert_eq!(
        page_keys(&source).await?,
        vec![vec!["a1", "b2"], vec!["c3", "d4"], vec!["e5"]]
    );
    Ok(())
}

#[tokio::test]
async fn full_last_page_has_no_cursor() -> Result<()> {
    let source = PagedSource::new(NdjsonTable::open(mock_path())).page_size(5);
    let mut pages = source.pages(&(), None);
    let page = pages.next_page().await?.expect("one page");
    assert_eq!(page.len(), 5);
    assert!(page.is_last());
    assert!(pages.next_page().await?.is_none());
    Ok(())
}

#[tokio::test]
async fn values_pass_through_or_reencode() -> Result<()> {
    let source = PagedSource::new(NdjsonTable::open(mock_path())).page_size(10);
    let mut pages = source.pages(&(), None);
    let rows = pages.next_page().await?.expect("page").into_parts().0;

    let by_key = |key: &str| -> &Item<String> {
        rows.iter().find(|row| row.key() == key).expect("row present")
    };
    let a1: Payload = serde_json::from_str(by_key("a1").payload())?;
    assert_eq!(a1, Payload::new("tex", "x^2"));
    let c3: Payload = serde_json::from_str(by_key("c3").payload())?;
    assert_eq!(c3, Payload::new("chem", "H2O"));
    assert_eq!(by_key("d4").payload(), "not a payload");
    Ok(())
}

#[tokio::test]
async fn resume_from_handled_cursor() -> Result<()> {
    let source = PagedSource::new(NdjsonTable::open(mock_path())).page_size(2);
    let mut pages = source.pages(&(), None);
    let first = pages.next_page().await?.expect("first page");
    let resume = first.next_cursor().cloned();
    assert!(resume.is_some());

    let mut seen = Vec::new();
    let stats = source
        .run(
            &(),
            resume,
            &mut handler_fn(|rows: Vec<Item<String>>| {
                seen.extend(rows.into_iter().map(|row| row.into_parts().0));
                async { Ok(()) }
            }),
        )
        .await?;

    assert_eq!(seen, vec!["c3", "d4", "e5"]);
    assert_eq!(stats.pages, 2);
    assert_eq!(stats.resume_from, None);
    Ok(())
}

#[tokio::test]
async fn undecodable_lines_are_skipped() -> Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(file, r#"{{"key":"a","value":"1"}}"#)?;
    writeln!(file, "{{truncated")?;
    writeln!(file, r#"{{"key":5,"value":"not a string key"}}"#)?;
    writeln!(file, r#"{{"key":"b","value":"2"}}"#)?;
    writeln!(file, r#"{{"key":"c","value":"3"}}"#)?;

    let source = PagedSource::new(NdjsonTable::open(file.path())).page_size(2);
    let mut seen = Vec::new();
    let stats = source
        .run(
            &(),
            None,
            &mut handler_fn(|rows: Vec<Item<String>>| {
                seen.push(rows.into_iter().map(|row| row.into_parts().0).collect::<Vec<_>>());
                async { Ok(()) }
            }),
        )
        .await?;

    assert_eq!(seen, vec![vec!["a", "b"], vec!["c"]]);
    assert_eq!(stats.rows, 3);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn malformed_cursor_fails_without_retrying() {
    let source = PagedSource::new(NdjsonTable::open(mock_path()));
    let before = tokio::time::Instant::now();
    let mut pages = source.pages(&(), Some(Cursor::new(vec![1u8, 2, 3])));

    let err = pages.next_page().await.unwrap_err();

    assert!(matches!(err, Error::Decode(_)), "unexpected error: {err:?}");
    assert_eq!(before.elapsed(), Duration::ZERO, "decode errors are not retried");
}

#[tokio::test]
async fn missing_file_is_io_error() {
    let source = PagedSource::new(NdjsonTable::open("/definitely/not/here.ndjson"))
        .retry(migrapipe::pipeline::retry::RetryPolicy::none());
    let err = source
        .run(&(), None, &mut handler_fn(|_rows: Vec<Item<String>>| async { Ok(()) }))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}
