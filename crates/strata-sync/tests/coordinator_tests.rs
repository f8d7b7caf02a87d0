//! Tests for optimistic mutation, rollback and stale response handling.

mod common;

use std::sync::Arc;

use parking_lot::Mutex;
use strata_core::{InvalidMutation, LayerNode, MoveOp, Mutation, NewGroup, NodeId, SyncKey, TreeError};
use strata_sync::{ApplyOutcome, SyncError};

use common::{RenderEvent, child_ids, coordinator, sample_tree};

fn visibility(id: &str, visible: bool) -> Mutation {
    Mutation::SetVisibility {
        id: id.into(),
        visible,
    }
}

fn rejected() -> SyncError {
    SyncError::rejected(500, Some("boom".into()))
}

#[tokio::test]
async fn test_visibility_confirmed() {
    let (coordinator, renderer) = coordinator(sample_tree());

    let outcome = coordinator.apply(visibility("base", false)).await.unwrap();
    assert_eq!(outcome, ApplyOutcome::Confirmed);

    let tree = coordinator.snapshot();
    assert_eq!(tree.find("osm").unwrap().visible(), Some(false));
    assert_eq!(tree.find("ortho").unwrap().visible(), Some(false));
    assert_eq!(
        renderer.events(),
        vec![
            RenderEvent::Visibility("osm".into(), false),
            RenderEvent::Visibility("ortho".into(), false),
        ]
    );
    assert_eq!(coordinator.service().calls(), vec!["visibility base=false"]);
    assert_eq!(coordinator.service().tokens(), vec!["base:visibility:1"]);
}

#[tokio::test]
async fn test_visibility_failure_rolls_back_and_notifies() {
    let (coordinator, renderer) = coordinator(sample_tree());
    coordinator.service().fail(1, rejected());

    let failures = Arc::new(Mutex::new(Vec::new()));
    let sink = failures.clone();
    coordinator.failed().connect(move |failure| sink.lock().push(failure.clone()));

    let err = coordinator.apply(visibility("base", false)).await.unwrap_err();
    assert_eq!(err, rejected());

    assert_eq!(coordinator.snapshot(), sample_tree());
    assert_eq!(
        renderer.events(),
        vec![
            RenderEvent::Visibility("osm".into(), false),
            RenderEvent::Visibility("ortho".into(), false),
            RenderEvent::Visibility("osm".into(), true),
            RenderEvent::Visibility("ortho".into(), true),
        ]
    );

    let failures = failures.lock();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].key, SyncKey::Node("base".into()));
    assert_eq!(failures[0].error, rejected());
}

#[tokio::test]
async fn test_local_rejection_skips_service() {
    let (coordinator, renderer) = coordinator(sample_tree());

    let err = coordinator
        .apply(Mutation::SetOpacity {
            id: "base".into(),
            opacity: 0.5,
        })
        .await
        .unwrap_err();
    assert_eq!(
        err,
        SyncError::Tree(TreeError::InvalidMutation(InvalidMutation::OpacityOnGroup("base".into())))
    );

    let err = coordinator.apply(visibility("missing", true)).await.unwrap_err();
    assert_eq!(err, SyncError::Tree(TreeError::not_found("missing")));

    assert!(coordinator.service().calls().is_empty());
    assert!(renderer.events().is_empty());
    assert_eq!(coordinator.snapshot(), sample_tree());
}

#[tokio::test]
async fn test_stale_failure_is_discarded() {
    let (coordinator, _renderer) = coordinator(sample_tree());
    let first_reply = coordinator.service().gate(1);

    let first = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.apply(visibility("roads", false)).await }
    });
    coordinator.service().wait_for_calls(1).await;

    let second = coordinator.apply(visibility("roads", true)).await.unwrap();
    assert_eq!(second, ApplyOutcome::Confirmed);

    first_reply.send(Err(rejected())).unwrap();
    assert_eq!(first.await.unwrap().unwrap(), ApplyOutcome::Superseded);

    // The newer value stands.
    assert_eq!(coordinator.snapshot().find("roads").unwrap().visible(), Some(true));
}

#[tokio::test]
async fn test_stale_success_is_discarded() {
    let (coordinator, _renderer) = coordinator(sample_tree());
    let first_reply = coordinator.service().gate(1);

    let first = tokio::spawn({
        let coordinator = coordinator.clone();
        async move {
            coordinator
                .apply(Mutation::SetOpacity {
                    id: "osm".into(),
                    opacity: 0.2,
                })
                .await
        }
    });
    coordinator.service().wait_for_calls(1).await;

    let second = coordinator
        .apply(Mutation::SetOpacity {
            id: "osm".into(),
            opacity: 0.9,
        })
        .await
        .unwrap();
    assert_eq!(second, ApplyOutcome::Confirmed);

    first_reply.send(Ok(())).unwrap();
    assert_eq!(first.await.unwrap().unwrap(), ApplyOutcome::Superseded);
    assert_eq!(coordinator.snapshot().find("osm").unwrap().opacity(), Some(0.9));
}

#[tokio::test]
async fn test_rejected_toggles_restore_original_newest_first() {
    let (coordinator, renderer) = coordinator(sample_tree());
    let first_reply = coordinator.service().gate(1);
    coordinator.service().fail(2, rejected());

    let first = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.apply(visibility("roads", false)).await }
    });
    coordinator.service().wait_for_calls(1).await;

    // Rolls back to the first toggle's value, which is still pending.
    let second = coordinator.apply(visibility("roads", true)).await.unwrap_err();
    assert_eq!(second, rejected());
    assert_eq!(coordinator.snapshot().find("roads").unwrap().visible(), Some(false));

    first_reply.send(Err(rejected())).unwrap();
    assert_eq!(first.await.unwrap().unwrap_err(), rejected());

    assert_eq!(coordinator.snapshot(), sample_tree());
    assert_eq!(renderer.events().last(), Some(&RenderEvent::Visibility("roads".into(), true)));
}

#[tokio::test]
async fn test_rejected_toggles_restore_original_oldest_first() {
    let (coordinator, _renderer) = coordinator(sample_tree());
    let first_reply = coordinator.service().gate(1);
    let second_reply = coordinator.service().gate(2);

    let first = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.apply(visibility("roads", false)).await }
    });
    coordinator.service().wait_for_calls(1).await;
    let second = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.apply(visibility("roads", true)).await }
    });
    coordinator.service().wait_for_calls(2).await;

    // The newer toggle now owns the way back to the original value.
    first_reply.send(Err(rejected())).unwrap();
    assert_eq!(first.await.unwrap().unwrap(), ApplyOutcome::Superseded);
    assert_eq!(coordinator.snapshot().find("roads").unwrap().visible(), Some(true));

    second_reply.send(Err(rejected())).unwrap();
    assert_eq!(second.await.unwrap().unwrap_err(), rejected());
    assert_eq!(coordinator.snapshot(), sample_tree());
}

#[tokio::test]
async fn test_rejected_add_is_removed_despite_newer_visibility_change() {
    let (coordinator, _renderer) = coordinator(sample_tree());
    let add_reply = coordinator.service().gate(1);

    let add = tokio::spawn({
        let coordinator = coordinator.clone();
        async move {
            coordinator
                .apply(Mutation::Add {
                    node: LayerNode::raster("dem", "DEM"),
                    parent_id: None,
                    index: None,
                })
                .await
        }
    });
    coordinator.service().wait_for_calls(1).await;

    let hide = coordinator.apply(visibility("dem", false)).await.unwrap();
    assert_eq!(hide, ApplyOutcome::Confirmed);

    add_reply.send(Err(rejected())).unwrap();
    assert_eq!(add.await.unwrap().unwrap_err(), rejected());
    assert!(!coordinator.snapshot().contains("dem"));
    assert_eq!(coordinator.snapshot(), sample_tree());
}

#[tokio::test]
async fn test_rejected_move_after_rejected_wrap_unwraps() {
    let (coordinator, _renderer) = coordinator(sample_tree());
    let wrap_reply = coordinator.service().gate(1);
    let move_reply = coordinator.service().gate(2);

    let wrap = tokio::spawn({
        let coordinator = coordinator.clone();
        async move {
            coordinator
                .apply(Mutation::Wrap {
                    moved_id: "roads".into(),
                    group: NewGroup::new("transport", "Transport"),
                })
                .await
        }
    });
    coordinator.service().wait_for_calls(1).await;
    let moved = tokio::spawn({
        let coordinator = coordinator.clone();
        async move {
            let op = MoveOp {
                moved_id: "roads".into(),
                from_parent_id: Some("transport".into()),
                to_parent_id: Some("base".into()),
                to_index: 0,
            };
            coordinator.apply(Mutation::Move(op)).await
        }
    });
    coordinator.service().wait_for_calls(2).await;

    wrap_reply.send(Err(rejected())).unwrap();
    assert_eq!(wrap.await.unwrap().unwrap(), ApplyOutcome::Superseded);
    move_reply.send(Err(rejected())).unwrap();
    assert!(moved.await.unwrap().is_err());

    assert_eq!(coordinator.snapshot(), sample_tree());
}

#[tokio::test]
async fn test_group_visibility_rollback_skips_newer_leaves() {
    let (coordinator, _renderer) = coordinator(sample_tree());
    let group_reply = coordinator.service().gate(1);

    let group = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.apply(visibility("base", false)).await }
    });
    coordinator.service().wait_for_calls(1).await;

    // A newer mutation takes ownership of "osm".
    let leaf = coordinator.apply(visibility("osm", false)).await.unwrap();
    assert_eq!(leaf, ApplyOutcome::Confirmed);

    group_reply.send(Err(rejected())).unwrap();
    assert_eq!(group.await.unwrap().unwrap_err(), rejected());

    let tree = coordinator.snapshot();
    assert_eq!(tree.find("osm").unwrap().visible(), Some(false));
    assert_eq!(tree.find("ortho").unwrap().visible(), Some(true));
}

#[tokio::test]
async fn test_opacity_rollback_restores_previous_value() {
    let (coordinator, renderer) = coordinator(sample_tree());
    coordinator.service().fail(1, SyncError::RemoteUnreachable("timed out".into()));

    let err = coordinator
        .apply(Mutation::SetOpacity {
            id: "ortho".into(),
            opacity: 0.1,
        })
        .await
        .unwrap_err();
    assert!(err.is_remote());

    assert_eq!(coordinator.snapshot().find("ortho").unwrap().opacity(), Some(0.6));
    assert_eq!(renderer.events().last(), Some(&RenderEvent::Opacity("ortho".into(), 0.6)));
}

#[tokio::test]
async fn test_rename_rollback() {
    let (coordinator, _renderer) = coordinator(sample_tree());
    coordinator.service().fail(1, rejected());

    let mutation = Mutation::Rename {
        id: "roads".into(),
        name: "  Streets ".into(),
    };
    assert!(coordinator.apply(mutation).await.is_err());
    assert_eq!(coordinator.service().calls(), vec!["rename roads=Streets"]);
    assert_eq!(coordinator.snapshot().find("roads").unwrap().name, "Roads");
}

#[tokio::test]
async fn test_reorder_requires_complete_permutation() {
    let (coordinator, _renderer) = coordinator(sample_tree());

    let err = coordinator
        .apply(Mutation::Reorder {
            parent_id: None,
            ordered_ids: vec!["roads".into(), "base".into()],
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SyncError::Tree(TreeError::InvalidMutation(InvalidMutation::IncompletePermutation { missing: 1, .. }))
    ));
    assert!(coordinator.service().calls().is_empty());
}

#[tokio::test]
async fn test_reorder_rollback_restores_order() {
    let (coordinator, _renderer) = coordinator(sample_tree());
    coordinator.service().fail(1, rejected());

    let mutation = Mutation::Reorder {
        parent_id: None,
        ordered_ids: vec!["parcels".into(), "base".into(), "roads".into()],
    };
    assert!(coordinator.apply(mutation).await.is_err());
    assert_eq!(coordinator.service().calls(), vec!["reorder <root> [parcels,base,roads]"]);
    assert_eq!(child_ids(&coordinator.snapshot(), None), vec!["base", "roads", "parcels"]);
}

#[tokio::test]
async fn test_move_rollback_restores_placement() {
    let (coordinator, _renderer) = coordinator(sample_tree());
    coordinator.service().fail(1, rejected());

    let op = MoveOp {
        moved_id: "roads".into(),
        from_parent_id: None,
        to_parent_id: Some("base".into()),
        to_index: 1,
    };
    assert!(coordinator.apply(Mutation::Move(op)).await.is_err());

    let tree = coordinator.snapshot();
    assert_eq!(child_ids(&tree, None), vec!["base", "roads", "parcels"]);
    assert_eq!(child_ids(&tree, Some("base")), vec!["osm", "ortho"]);
}

#[tokio::test]
async fn test_delete_rollback_reinserts_at_index() {
    let (coordinator, renderer) = coordinator(sample_tree());
    coordinator.service().fail(1, rejected());

    assert!(coordinator.apply(Mutation::Delete { id: "base".into() }).await.is_err());

    assert_eq!(coordinator.snapshot(), sample_tree());
    let events = renderer.events();
    assert_eq!(events[0], RenderEvent::Visibility("osm".into(), false));
    assert_eq!(events[1], RenderEvent::Visibility("ortho".into(), false));
    assert!(events.contains(&RenderEvent::Visibility("osm".into(), true)));
    assert!(events.contains(&RenderEvent::Opacity("ortho".into(), 0.6)));
}

#[tokio::test]
async fn test_add_reconciles_server_id() {
    let (coordinator, _renderer) = coordinator(sample_tree());
    coordinator.service().assign_id("tmp-1", "srv-42");

    let reconciled = Arc::new(Mutex::new(Vec::new()));
    let sink = reconciled.clone();
    coordinator
        .id_reconciled()
        .connect(move |(old, new)| sink.lock().push((old.to_string(), new.to_string())));

    let outcome = coordinator
        .apply(Mutation::Add {
            node: LayerNode::raster("tmp-1", "Hillshade"),
            parent_id: Some("base".into()),
            index: None,
        })
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ApplyOutcome::Created {
            temp_id: NodeId::from("tmp-1"),
            server_id: NodeId::from("srv-42"),
        }
    );
    let tree = coordinator.snapshot();
    assert!(!tree.contains("tmp-1"));
    assert_eq!(child_ids(&tree, Some("base")), vec!["osm", "ortho", "srv-42"]);
    assert_eq!(*reconciled.lock(), vec![("tmp-1".to_string(), "srv-42".to_string())]);
}

#[tokio::test]
async fn test_add_at_index_moves_after_create() {
    let (coordinator, _renderer) = coordinator(sample_tree());

    coordinator
        .apply(Mutation::Add {
            node: LayerNode::raster("dem", "DEM"),
            parent_id: None,
            index: Some(0),
        })
        .await
        .unwrap();

    assert_eq!(
        coordinator.service().calls(),
        vec!["add dem under <root>", "move dem -> <root>@0"]
    );
    assert_eq!(coordinator.service().tokens(), vec!["dem:add:1", "dem:add:1.place"]);
    assert_eq!(child_ids(&coordinator.snapshot(), None), vec!["dem", "base", "roads", "parcels"]);
}

#[tokio::test]
async fn test_add_failure_removes_node() {
    let (coordinator, renderer) = coordinator(sample_tree());
    coordinator.service().fail(1, rejected());

    let mutation = Mutation::Add {
        node: LayerNode::raster("dem", "DEM"),
        parent_id: None,
        index: None,
    };
    assert!(coordinator.apply(mutation).await.is_err());

    assert!(!coordinator.snapshot().contains("dem"));
    assert_eq!(renderer.events().last(), Some(&RenderEvent::Visibility("dem".into(), false)));
}

#[tokio::test]
async fn test_wrap_creates_group_then_moves() {
    let (coordinator, _renderer) = coordinator(sample_tree());
    coordinator.service().assign_id("new-group", "g-7");

    let outcome = coordinator
        .apply(Mutation::Wrap {
            moved_id: "roads".into(),
            group: NewGroup::new("new-group", "Transport"),
        })
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ApplyOutcome::Created {
            temp_id: NodeId::from("new-group"),
            server_id: NodeId::from("g-7"),
        }
    );
    assert_eq!(
        coordinator.service().calls(),
        vec!["add new-group under <root>", "move g-7 -> <root>@1", "move roads -> g-7@0"]
    );
    assert_eq!(
        coordinator.service().tokens(),
        vec!["roads:wrap:1", "roads:wrap:1.place", "roads:wrap:1.pack"]
    );
    let tree = coordinator.snapshot();
    assert_eq!(child_ids(&tree, None), vec!["base", "g-7", "parcels"]);
    assert_eq!(child_ids(&tree, Some("g-7")), vec!["roads"]);
}

#[tokio::test]
async fn test_wrap_rollback_removes_group() {
    let (coordinator, _renderer) = coordinator(sample_tree());
    coordinator.service().fail(1, rejected());

    let mutation = Mutation::Wrap {
        moved_id: "roads".into(),
        group: NewGroup::new("new-group", "Transport"),
    };
    assert!(coordinator.apply(mutation).await.is_err());
    assert_eq!(coordinator.snapshot(), sample_tree());
}

#[tokio::test]
async fn test_hydrate_replaces_tree_and_pushes_state() {
    let (coordinator, renderer) = coordinator(sample_tree());
    coordinator
        .service()
        .queue_tree(vec![LayerNode::raster("only", "Only").with_opacity(0.3)]);

    let replaced = Arc::new(Mutex::new(0));
    let count = replaced.clone();
    coordinator.tree_replaced().connect(move |_| *count.lock() += 1);

    coordinator.hydrate().await.unwrap();

    assert_eq!(child_ids(&coordinator.snapshot(), None), vec!["only"]);
    assert_eq!(
        renderer.events(),
        vec![
            RenderEvent::Visibility("only".into(), true),
            RenderEvent::Opacity("only".into(), 0.3),
        ]
    );
    assert_eq!(*replaced.lock(), 1);
}

#[tokio::test]
async fn test_hydrate_makes_in_flight_responses_stale() {
    let (coordinator, _renderer) = coordinator(sample_tree());
    coordinator.service().queue_tree(sample_tree().into_roots());
    let reply = coordinator.service().gate(1);

    let pending = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.apply(visibility("roads", false)).await }
    });
    coordinator.service().wait_for_calls(1).await;

    coordinator.hydrate().await.unwrap();
    reply.send(Err(rejected())).unwrap();

    assert_eq!(pending.await.unwrap().unwrap(), ApplyOutcome::Superseded);
    assert_eq!(coordinator.snapshot().find("roads").unwrap().visible(), Some(true));
}
