/*!
 * Directory tree expansion over real PROPFIND round trips.
 */

use std::sync::Arc;

use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use davsync::models::{Credentials, StaticCredentials};
use davsync::services::webdav::{ConcurrencyConfig, TreeError};
use davsync::{DirectoryTreeBuilder, RemoteEntry, WebDAVConfig, WebDAVService};

fn multistatus(entries: &[(&str, &str, bool)]) -> String {
    let responses: String = entries
        .iter()
        .map(|(href, name, is_folder)| {
            let resource_type = if *is_folder {
                "<d:resourcetype><d:collection/></d:resourcetype>"
            } else {
                "<d:resourcetype/>"
            };
            format!(
                "<d:response><d:href>{}</d:href><d:propstat><d:prop>\
                 <d:displayname>{}</d:displayname>{}<d:getetag>\"abc\"</d:getetag>\
                 </d:prop><d:status>HTTP/1.1 200 OK</d:status></d:propstat></d:response>",
                href, name, resource_type
            )
        })
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<d:multistatus xmlns:d=\"DAV:\">{}</d:multistatus>",
        responses
    )
}

async fn mount_listing(server: &MockServer, at: &str, body: String) {
    Mock::given(method("PROPFIND"))
        .and(path(at))
        .and(header("Depth", "1"))
        .respond_with(ResponseTemplate::new(207).set_body_string(body))
        .expect(1)
        .mount(server)
        .await;
}

fn service_for(server: &MockServer) -> WebDAVService {
    WebDAVService::new(
        WebDAVConfig::new(server.uri()),
        Arc::new(StaticCredentials(Credentials::new("", "user", "pass"))),
    )
    .expect("Failed to create WebDAV service")
}

#[tokio::test]
async fn test_three_level_tree_over_webdav() {
    let server = MockServer::start().await;
    mount_listing(
        &server,
        "/dav/journal/",
        multistatus(&[
            ("/dav/journal/", "journal", true),
            ("/dav/journal/2024/", "2024", true),
        ]),
    )
    .await;
    mount_listing(
        &server,
        "/dav/journal/2024/",
        multistatus(&[
            ("/dav/journal/2024/", "2024", true),
            ("/dav/journal/2024/journal_db_backup.zip", "journal_db_backup.zip", false),
        ]),
    )
    .await;

    let service = service_for(&server);
    let listing = service.list("").await;
    let builder = DirectoryTreeBuilder::new(Arc::new(service));
    let tree = builder.build_tree(listing).await.unwrap();

    assert!(tree.is_folder());
    assert_eq!(tree.file_name, "journal");

    let children = tree.children.as_ref().unwrap();
    assert_eq!(children.len(), 1);
    assert!(children[0].is_folder());
    assert_eq!(children[0].file_name, "2024");

    let leaves = children[0].children.as_ref().unwrap();
    assert_eq!(leaves.len(), 1);
    assert!(leaves[0].is_file());
    assert_eq!(leaves[0].file_name, "journal_db_backup.zip");
}

#[tokio::test]
async fn test_sequential_and_parallel_expansion_agree() {
    let server = MockServer::start().await;
    let root = multistatus(&[
        ("/dav/journal/", "journal", true),
        ("/dav/journal/a/", "a", true),
        ("/dav/journal/top.zip", "top.zip", false),
        ("/dav/journal/b/", "b", true),
        ("/dav/journal/c/", "c", true),
    ]);
    let a = multistatus(&[
        ("/dav/journal/a/", "a", true),
        ("/dav/journal/a/deep/", "deep", true),
        ("/dav/journal/a/a1.zip", "a1.zip", false),
    ]);
    let deep = multistatus(&[
        ("/dav/journal/a/deep/", "deep", true),
        ("/dav/journal/a/deep/d1.zip", "d1.zip", false),
    ]);
    let b = multistatus(&[("/dav/journal/b/", "b", true), ("/dav/journal/b/b1.zip", "b1.zip", false)]);
    let c = multistatus(&[("/dav/journal/c/", "c", true)]);

    for (at, body) in [
        ("/dav/journal/a/", &a),
        ("/dav/journal/a/deep/", &deep),
        ("/dav/journal/b/", &b),
        ("/dav/journal/c/", &c),
    ] {
        Mock::given(method("PROPFIND"))
            .and(path(at))
            .respond_with(ResponseTemplate::new(207).set_body_string(body.clone()))
            .mount(&server)
            .await;
    }
    Mock::given(method("PROPFIND"))
        .and(path("/dav/journal/"))
        .respond_with(ResponseTemplate::new(207).set_body_string(root))
        .mount(&server)
        .await;

    let service = Arc::new(service_for(&server));
    let sequential = DirectoryTreeBuilder::with_concurrency(
        service.clone(),
        ConcurrencyConfig { max_concurrent_listings: 1 },
    )
    .build_tree_for("")
    .await
    .unwrap();
    let parallel = DirectoryTreeBuilder::with_concurrency(
        service,
        ConcurrencyConfig { max_concurrent_listings: 8 },
    )
    .build_tree_for("")
    .await
    .unwrap();

    assert_eq!(sequential, parallel);

    let order: Vec<&str> = parallel.walk().map(|e| e.file_name.as_str()).collect();
    assert_eq!(
        order,
        vec!["journal", "a", "deep", "d1.zip", "a1.zip", "top.zip", "b", "b1.zip", "c"]
    );
    assert_eq!(parallel.file_count(), 4);
    let c_node = &parallel.children.as_ref().unwrap()[3];
    assert_eq!(c_node.children, Some(Vec::<RemoteEntry>::new()));
}

#[tokio::test]
async fn test_tree_of_failed_root_listing_is_invalid() {
    let server = MockServer::start().await;
    Mock::given(method("PROPFIND"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let builder = DirectoryTreeBuilder::new(Arc::new(service_for(&server)));
    assert!(matches!(
        builder.build_tree_for("").await,
        Err(TreeError::InvalidListing(_))
    ));
}
