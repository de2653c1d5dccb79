//! Saving and restoring engine and node state

use pretty_assertions::assert_eq;
use stave_core::{
    DocumentStore, MemoryStore, RemoteLocator, StashToggle, VcsConfig, VcsError, VersionControl,
    VersionControlNode, VCS_NODE,
};
use stave_delta::items::TrackHeader;
use stave_delta::{DocumentNode, TrackedItem};
use stave_test_utils::{init_engine, FixtureProject, MemoryConnector, MemoryRemote};

#[test]
fn save_and_load_restores_history_and_stash() {
    let mut project = FixtureProject::with_tracks(&["Drums"]);
    let mut vcs = init_engine(&project);
    project.meta.set_title("Saved");
    vcs.commit(&project, "retitle", "Alice").unwrap();
    project.meta.set_description("unfinished");
    vcs.stash(&mut project).unwrap();

    let mut store = MemoryStore::new();
    vcs.save(&mut store).unwrap();

    let mut restored = VersionControl::new(VcsConfig::new());
    assert!(restored.load(&store).unwrap());
    assert_eq!(restored.head(), vcs.head());
    assert_eq!(restored.history().len(), 2);
    assert_eq!(restored.stash_slot(), vcs.stash_slot());

    restored.unstash(&mut project).unwrap();
    assert_eq!(project.meta.description(), "unfinished");
}

#[test]
fn load_from_empty_store_reports_nothing() {
    let mut vcs = VersionControl::new(VcsConfig::new());
    assert!(!vcs.load(&MemoryStore::new()).unwrap());
    assert!(vcs.head().is_none());
}

#[test]
fn tampered_document_is_rejected() {
    let mut project = FixtureProject::new();
    let mut vcs = init_engine(&project);
    project.meta.set_author("Bob");
    vcs.commit(&project, "credit", "Bob").unwrap();

    let node = vcs.serialize();
    let mut forged = DocumentNode::new(VCS_NODE);
    for (key, value) in node.properties() {
        forged.set_property(key.clone(), value.clone());
    }
    for (i, child) in node.children().iter().enumerate() {
        let child = if i == 1 {
            child.clone().with_property("message", "rewritten")
        } else {
            child.clone()
        };
        forged.add_child(child);
    }

    let mut store = MemoryStore::new();
    store.write_node(forged).unwrap();
    let mut restored = VersionControl::new(VcsConfig::new());
    assert!(matches!(
        restored.load(&store),
        Err(VcsError::IntegrityViolation(_))
    ));
    assert!(restored.history().is_empty());
}

#[test]
fn dangling_head_is_rejected() {
    let project = FixtureProject::new();
    let vcs = init_engine(&project);
    let node = vcs
        .serialize()
        .with_property("head", "ab".repeat(32));
    let mut restored = VersionControl::new(VcsConfig::new());
    assert!(matches!(
        restored.deserialize(&node),
        Err(VcsError::UnknownRevision(_))
    ));
}

#[test]
fn node_round_trip_keeps_remote_and_stats() {
    let mut project = FixtureProject::new();
    let connector = MemoryConnector::new();
    let mut node = VersionControlNode::init(&project, VcsConfig::new(), connector.clone()).unwrap();
    node.set_remote(RemoteLocator::new("memory://band"));

    project.meta.set_title("Second");
    assert!(node.request_commit(&project, "second").unwrap().is_some());
    assert_eq!(node.request_commit(&project, "again").unwrap(), None);
    assert_eq!(node.stats_string(), "2 revisions, 5 changes");

    let mut back = VersionControlNode::new(VcsConfig::new(), connector);
    back.deserialize(&node.serialize()).unwrap();
    assert_eq!(back.remote_locator(), node.remote_locator());
    assert_eq!(back.stats_string(), node.stats_string());

    back.reset();
    assert!(back.remote_locator().is_none());
    assert_eq!(back.stats_string(), "0 revisions, 0 changes");
}

#[test]
fn node_stash_toggle_cycles() {
    let mut project = FixtureProject::new();
    let mut node =
        VersionControlNode::init(&project, VcsConfig::new(), MemoryConnector::new()).unwrap();

    assert_eq!(node.request_stash_toggle(&mut project).unwrap(), StashToggle::Nothing);
    project.meta.set_description("idea");
    assert_eq!(node.request_stash_toggle(&mut project).unwrap(), StashToggle::Stashed(1));
    assert_eq!(project.meta.description(), "");
    assert_eq!(node.request_stash_toggle(&mut project).unwrap(), StashToggle::Unstashed(1));
    assert_eq!(project.meta.description(), "idea");
}

#[test]
fn node_stash_toggle_reaches_slot_past_new_track() {
    let mut project = FixtureProject::new();
    let mut node =
        VersionControlNode::init(&project, VcsConfig::new(), MemoryConnector::new()).unwrap();

    project.meta.set_description("Draft 1");
    assert_eq!(node.request_stash_toggle(&mut project).unwrap(), StashToggle::Stashed(1));

    project.tracks.push(TrackHeader::new("Drums"));
    assert!(!node.engine().status(&project).is_clean());
    assert_eq!(node.request_stash_toggle(&mut project).unwrap(), StashToggle::Unstashed(1));
    assert_eq!(project.meta.description(), "Draft 1");
    assert!(project.track("Drums").is_some());
    assert!(!node.engine().has_stash());
}

#[test]
fn node_stash_toggle_with_only_new_track_is_nothing() {
    let mut project = FixtureProject::new();
    let mut node =
        VersionControlNode::init(&project, VcsConfig::new(), MemoryConnector::new()).unwrap();
    project.tracks.push(TrackHeader::new("Drums"));
    assert_eq!(node.request_stash_toggle(&mut project).unwrap(), StashToggle::Nothing);
    assert_eq!(project.tracks.len(), 1);
}

#[test]
fn node_commits_project_info_only() {
    let mut project = FixtureProject::with_tracks(&["Keys"]);
    let mut node =
        VersionControlNode::init(&project, VcsConfig::new(), MemoryConnector::new()).unwrap();
    project.meta.set_license("CC-BY");
    project.track_mut("Keys").unwrap().set_muted(true);

    let id = node.commit_project_info(&project, "license").unwrap().unwrap();
    let changes = node.engine().changes(id).unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].0, project.meta.vcs_id());
    assert_eq!(node.engine().status(&project).change_count(), 1);
}

#[tokio::test]
async fn node_clones_and_pushes_through_connector() {
    let alice_project = FixtureProject::with_tracks(&["Drums"]);
    let alice = init_engine(&alice_project);
    let remote = MemoryRemote::seeded_from(&alice);
    let connector = MemoryConnector::new();
    connector.register("memory://band", remote.clone());

    let mut bob_project = FixtureProject::blank();
    let mut bob = VersionControlNode::new(VcsConfig::new(), connector);
    let cancel = stave_core::CancellationToken::new();
    let head = bob
        .request_clone(&mut bob_project, RemoteLocator::new("memory://band"), &cancel)
        .await
        .unwrap();
    assert_eq!(Some(head), alice.head());
    assert_eq!(bob_project.meta.author(), "Alice");

    bob_project.meta.set_author("Bob");
    bob.request_commit(&bob_project, "credit").unwrap();
    assert_eq!(bob.request_push(&cancel).await.unwrap(), 1);
    assert_eq!(remote.revision_count(), 2);
    assert_eq!(remote.pushed(), bob.engine().head().into_iter().collect::<Vec<_>>());
}
