//! Behavior shared by every stub repository, run against both storage
//! variants.

use rift_store::{FilesystemStubRepository, InMemoryStubRepository, Stub, StubRepository};
use serde_json::{json, Value};
use tempfile::TempDir;

type Repo = Box<dyn StubRepository>;

fn stub(path: &str, bodies: &[&str]) -> Stub {
    Stub::new(
        vec![json!({"equals": {"path": path}})],
        bodies.iter().map(|b| json!({"is": {"body": b}})).collect(),
    )
}

fn paths(stubs: &[Stub]) -> Vec<String> {
    stubs
        .iter()
        .map(|s| s.predicates[0]["equals"]["path"].as_str().unwrap().to_string())
        .collect()
}

fn matches_path(path: &'static str) -> impl Fn(&[Value]) -> bool + Send + Sync {
    move |predicates: &[Value]| {
        predicates
            .first()
            .is_some_and(|p| p["equals"]["path"] == path)
    }
}

async fn serves_responses_in_repeat_order(repo: Repo) {
    repo.add(Stub::new(
        vec![],
        vec![
            json!({"is": {"body": "first"}, "_behaviors": {"repeat": 2}}),
            json!({"is": {"body": "second"}}),
        ],
    ))
    .await
    .unwrap();

    let all = |_: &[Value]| true;
    let matched = repo.first(&all, 0).await.unwrap();
    let mut served = Vec::new();
    for _ in 0..4 {
        let response = matched.stub.next_response().await.unwrap();
        served.push(response["is"]["body"].as_str().unwrap().to_string());
    }
    assert_eq!(served, vec!["first", "first", "second", "first"]);
}

async fn cycle_position_survives_new_handles(repo: Repo) {
    repo.add(stub("/", &["a", "b"])).await.unwrap();

    let all = |_: &[Value]| true;
    let first = repo.first(&all, 0).await.unwrap();
    assert_eq!(first.stub.next_response().await.unwrap()["is"]["body"], "a");

    let again = repo.first(&all, 0).await.unwrap();
    assert_eq!(again.stub.next_response().await.unwrap()["is"]["body"], "b");
}

async fn empty_stub_serves_default_response(repo: Repo) {
    repo.add(Stub::new(vec![], vec![])).await.unwrap();

    let all = |_: &[Value]| true;
    let matched = repo.first(&all, 0).await.unwrap();
    assert!(matched.success);
    for _ in 0..3 {
        assert_eq!(matched.stub.next_response().await.unwrap(), json!({"is": {}}));
    }
    assert!(repo.to_json().await.unwrap()[0].responses.is_empty());
}

async fn first_returns_matching_index(repo: Repo) {
    repo.overwrite_all(vec![stub("/a", &["a"]), stub("/b", &["b"]), stub("/c", &["c"])])
        .await
        .unwrap();

    let filter = matches_path("/b");
    let matched = repo.first(&filter, 0).await.unwrap();
    assert!(matched.success);
    assert_eq!(matched.index, Some(1));
    assert_eq!(matched.stub.next_response().await.unwrap()["is"]["body"], "b");

    let filter = matches_path("/a");
    let later = repo.first(&filter, 1).await.unwrap();
    assert!(!later.success);

    let filter = matches_path("/missing");
    let missed = repo.first(&filter, 0).await.unwrap();
    assert!(!missed.success);
    assert_eq!(missed.index, None);
    assert_eq!(missed.stub.next_response().await.unwrap(), json!({"is": {}}));
}

async fn insert_then_delete_restores_list(repo: Repo) {
    let original = vec![stub("/a", &["a"]), stub("/b", &["b"]), stub("/c", &["c"])];
    repo.overwrite_all(original.clone()).await.unwrap();

    for index in 0..=original.len() {
        repo.insert_at_index(stub("/new", &["n"]), index).await.unwrap();
        let mut expected = paths(&original);
        expected.insert(index, "/new".to_string());
        assert_eq!(paths(&repo.to_json().await.unwrap()), expected);

        repo.delete_at_index(index).await.unwrap();
        assert_eq!(repo.to_json().await.unwrap(), original, "index {index}");
    }
}

async fn overwrite_all_replaces_everything(repo: Repo) {
    repo.overwrite_all(vec![stub("/old", &["x", "y"])]).await.unwrap();

    let replacement = vec![stub("/a", &["a"]), stub("/b", &["b1", "b2"])];
    repo.overwrite_all(replacement.clone()).await.unwrap();
    assert_eq!(repo.to_json().await.unwrap(), replacement);
    assert_eq!(repo.count().await.unwrap(), 2);
}

async fn overwrite_at_index_replaces_one(repo: Repo) {
    repo.overwrite_all(vec![stub("/a", &["a"]), stub("/b", &["b"])])
        .await
        .unwrap();

    repo.overwrite_at_index(stub("/B", &["B"]), 1).await.unwrap();
    assert_eq!(paths(&repo.to_json().await.unwrap()), vec!["/a", "/B"]);

    let err = repo
        .overwrite_at_index(stub("/z", &["z"]), 2)
        .await
        .unwrap_err();
    assert!(err.is_missing_resource());
}

async fn delete_beyond_end_is_missing_resource(repo: Repo) {
    repo.overwrite_all(vec![stub("/a", &["a"])]).await.unwrap();

    let err = repo.delete_at_index(3).await.unwrap_err();
    assert!(err.is_missing_resource());
    assert_eq!(paths(&repo.to_json().await.unwrap()), vec!["/a"]);
}

async fn saved_proxy_responses_are_purged(repo: Repo) {
    let recorded = json!({"is": {"body": "recorded", "_proxyResponseTime": 12}});
    repo.overwrite_all(vec![
        Stub::new(vec![json!({"equals": {"path": "/rec"}})], vec![recorded.clone()]),
        Stub::new(
            vec![json!({"equals": {"path": "/mixed"}})],
            vec![json!({"is": {"body": "author"}}), recorded],
        ),
        Stub::new(
            vec![json!({"equals": {"path": "/proxy"}})],
            vec![json!({"proxy": {"to": "http://origin"}})],
        ),
    ])
    .await
    .unwrap();

    repo.delete_saved_proxy_responses().await.unwrap();

    let stubs = repo.to_json().await.unwrap();
    assert_eq!(paths(&stubs), vec!["/mixed", "/proxy"]);
    assert_eq!(stubs[0].responses, vec![json!({"is": {"body": "author"}})]);
}

async fn added_responses_extend_the_cycle(repo: Repo) {
    repo.add(stub("/", &["a"])).await.unwrap();

    let all = |_: &[Value]| true;
    let matched = repo.first(&all, 0).await.unwrap();
    matched
        .stub
        .add_response(json!({"is": {"body": "b"}}))
        .await
        .unwrap();

    let mut served = Vec::new();
    for _ in 0..3 {
        let response = matched.stub.next_response().await.unwrap();
        served.push(response["is"]["body"].as_str().unwrap().to_string());
    }
    assert_eq!(served, vec!["a", "b", "a"]);
    assert_eq!(repo.to_json().await.unwrap()[0].responses.len(), 2);
}

async fn request_log_round_trip(repo: Repo) {
    repo.add_request(json!({"path": "/1"})).await.unwrap();
    repo.add_request(json!({"path": "/2"})).await.unwrap();
    assert_eq!(
        repo.load_requests().await.unwrap(),
        vec![json!({"path": "/1"}), json!({"path": "/2"})]
    );

    repo.delete_saved_requests().await.unwrap();
    assert!(repo.load_requests().await.unwrap().is_empty());
}

macro_rules! contract_tests {
    ($($name:ident),* $(,)?) => {
        mod in_memory {
            use super::*;
            $(
                #[tokio::test]
                async fn $name() {
                    super::$name(Box::new(InMemoryStubRepository::new())).await;
                }
            )*
        }

        mod filesystem {
            use super::*;
            $(
                #[tokio::test]
                async fn $name() {
                    let dir = TempDir::new().unwrap();
                    let repo = FilesystemStubRepository::new(dir.path().join("4545"));
                    super::$name(Box::new(repo)).await;
                }
            )*
        }
    };
}

contract_tests!(
    serves_responses_in_repeat_order,
    cycle_position_survives_new_handles,
    empty_stub_serves_default_response,
    first_returns_matching_index,
    insert_then_delete_restores_list,
    overwrite_all_replaces_everything,
    overwrite_at_index_replaces_one,
    delete_beyond_end_is_missing_resource,
    saved_proxy_responses_are_purged,
    added_responses_extend_the_cycle,
    request_log_round_trip,
);

#[tokio::test]
async fn overwrite_all_leaves_no_discarded_response_files() {
    let dir = TempDir::new().unwrap();
    let imposter_dir = dir.path().join("4545");
    let repo = FilesystemStubRepository::new(&imposter_dir);

    repo.overwrite_all(vec![stub("/a", &["a"]), stub("/b", &["b1", "b2", "b3"])])
        .await
        .unwrap();
    repo.overwrite_all(vec![stub("/c", &["c"])]).await.unwrap();

    let stub_dirs: Vec<_> = std::fs::read_dir(imposter_dir.join("stubs"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert_eq!(stub_dirs.len(), 1);

    let responses: Vec<_> = std::fs::read_dir(imposter_dir.join("stubs/0/responses"))
        .unwrap()
        .collect();
    assert_eq!(responses.len(), 1);
}
