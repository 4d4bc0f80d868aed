use serde_json::{json, Value};
use vdir_adapters::parse_space_rows;
use vdir_core::Row;
use vdir_storage::{find_by_slug, MemoryStore, ReportStore};
use vdir_sync::{merge_csv, MatchConfig};

const EXPORT: &str = "\
Title,Slug,City,Type,Architect / Interior,Brand,Year of Opening,Michelin Stars,Location,Main Image,Gallery
The Mark Hotel,,new-york,Hotel,Jacques Grange,,2009,,Upper East Side,,https://img/1.jpg;https://img/2.jpg
Aman Tokyo Spa,,tokyo,Hotel,Kerry Hill,,,,,,
New Cafe,,paris,Cafe,,,,,,https://img/cafe.jpg,
Incomplete,,,Bar,,,,,,,
";

fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        other => panic!("rows are objects, got {other}"),
    }
}

async fn directory() -> MemoryStore {
    let store = MemoryStore::directory();
    store
        .seed(
            "destinations",
            vec![
                row(json!({"slug": "the-mark", "name": "The Mark", "city": "new-york", "country": "USA", "gallery": ["https://img/1.jpg"]})),
                row(json!({"slug": "aman-tokyo", "name": "Aman Tokyo", "city": "tokyo", "country": "Japan"})),
            ],
        )
        .await;
    store
}

#[tokio::test]
async fn export_is_merged_into_directory() {
    let store = directory().await;
    let rows = parse_space_rows(EXPORT.as_bytes()).expect("export");

    let report = merge_csv(&store, &rows, &MatchConfig::default())
        .await
        .expect("merge");
    assert_eq!(report.count("updated"), 1);
    assert_eq!(report.count("manual_review"), 1);
    assert_eq!(report.count("added"), 1);
    assert_eq!(report.count("skipped_incomplete"), 1);

    let mark = find_by_slug(&store, "the-mark").await.expect("lookup").expect("mark");
    assert_eq!(mark.text("architect").as_deref(), Some("Jacques Grange"));
    assert_eq!(mark.value("year_opened"), json!(2009));
    assert_eq!(mark.list("gallery"), vec!["https://img/1.jpg", "https://img/2.jpg"]);
    assert_eq!(mark.text("country").as_deref(), Some("USA"));

    let aman = find_by_slug(&store, "aman-tokyo").await.expect("lookup").expect("aman");
    assert!(!aman.has_value("architect"));
    let review = &report.manual_review[0];
    assert_eq!(review["csv_title"], json!("Aman Tokyo Spa"));
    assert_eq!(review["csv_city"], json!("tokyo"));
    assert_eq!(review["action"], json!("MANUAL_REVIEW_NEEDED"));
    let score = review["similarity"].as_f64().expect("score");
    assert!((0.7..0.9).contains(&score), "score {score}");

    let cafe = find_by_slug(&store, "new-cafe").await.expect("lookup").expect("cafe");
    assert_eq!(cafe.name, "New Cafe");
    assert_eq!(cafe.city.as_deref(), Some("paris"));
    assert_eq!(cafe.category.as_deref(), Some("Cafe"));
    assert_eq!(cafe.country.as_deref(), Some("Unknown"));
    assert_eq!(cafe.text("image").as_deref(), Some("https://img/cafe.jpg"));
    assert_eq!(cafe.value("description"), json!(""));
    assert_eq!(store.rows("destinations").await.len(), 3);
}

#[tokio::test]
async fn report_keeps_review_list_on_disk() {
    let store = directory().await;
    let rows = parse_space_rows(EXPORT.as_bytes()).expect("export");
    let report = merge_csv(&store, &rows, &MatchConfig::default())
        .await
        .expect("merge");

    let dir = tempfile::tempdir().expect("tempdir");
    let path = report.save(&ReportStore::new(dir.path())).await.expect("save");
    let saved: Value = serde_json::from_str(&std::fs::read_to_string(path).expect("read")).expect("json");
    assert_eq!(saved["job"], json!("merge-csv"));
    assert_eq!(saved["counts"]["added"], json!(1));
    assert_eq!(saved["manual_review"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn rerunning_the_export_adds_nothing_new() {
    let store = directory().await;
    let rows = parse_space_rows(EXPORT.as_bytes()).expect("export");
    merge_csv(&store, &rows, &MatchConfig::default()).await.expect("first");

    let again = merge_csv(&store, &rows, &MatchConfig::default()).await.expect("second");
    assert_eq!(again.count("added"), 0);
    assert_eq!(store.rows("destinations").await.len(), 3);
}
