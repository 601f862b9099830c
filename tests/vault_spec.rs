use chrono::NaiveDate;
use goalstack::db::{Database, StoreError};
use goalstack::models::*;
use goalstack::vault::{export_vault, import_vault, read_vault, ExportOptions, APP_VERSION};
use speculate2::speculate;

struct Seeded {
    workspace: Workspace,
}

/// A workspace with a sprint, a goal tree, one dependency and a journal entry.
fn seed(db: &Database) -> Seeded {
    let workspace = db
        .create_workspace(CreateWorkspaceInput {
            name: "Home".to_string(),
            slug: None,
        })
        .expect("workspace");
    let day = NaiveDate::from_ymd_opt(2025, 3, 3).expect("valid date");
    let sprint = db.bootstrap_sprints(workspace.id, day, 2).expect("sprints").remove(0);
    db.start_sprint(sprint.id).expect("start sprint");

    let parent = db
        .add_goal(CreateGoalInput {
            tags: vec!["release".to_string()],
            recurrence_rule: Some("weekly:fri".to_string()),
            ..CreateGoalInput::new("Ship it").in_sprint(sprint.id)
        })
        .expect("parent");
    let child = db
        .add_subtask(parent.id, CreateGoalInput::new("Write notes"))
        .expect("child");
    let blocker = db
        .add_goal(CreateGoalInput::new("Fix build").in_workspace(workspace.id))
        .expect("blocker");
    db.add_dependency(child.id, blocker.id).expect("dependency");

    db.add_journal_entry(CreateJournalEntryInput {
        workspace_id: workspace.id,
        date: day,
        sprint_id: Some(sprint.id),
        goal_id: Some(parent.id),
        content: "Kicked off".to_string(),
        tags: vec![],
    })
    .expect("journal");

    Seeded { workspace }
}

fn goal_named(db: &Database, description: &str) -> Goal {
    db.snapshot()
        .expect("snapshot")
        .goals
        .into_iter()
        .find(|g| g.description == description)
        .unwrap_or_else(|| panic!("no goal named {description}"))
}

speculate! {
    before {
        let source = Database::open_memory().expect("Failed to create source database");
        let seeded = seed(&source);
        let target = Database::open_memory().expect("Failed to create target database");
    }

    describe "plain vaults" {
        it "carry version, timestamp and every table" {
            let payload = export_vault(&source, &ExportOptions::default()).unwrap();
            let doc = read_vault(&payload, None).unwrap();

            assert_eq!(doc.app_version, APP_VERSION);
            assert_eq!(doc.data.workspaces.len(), 1);
            assert_eq!(doc.data.days.len(), 1);
            assert_eq!(doc.data.sprints.len(), 2);
            assert_eq!(doc.data.goals.len(), 3);
            assert_eq!(doc.data.journal_entries.len(), 1);
            assert_eq!(doc.data.task_deps.len(), 1);
        }

        it "import with fresh ids and rewritten references" {
            let payload = export_vault(&source, &ExportOptions { pretty: true, ..Default::default() }).unwrap();
            let summary = import_vault(&target, &payload, None).unwrap();

            assert_eq!(summary.workspaces_created, 1);
            assert_eq!(summary.sprints_created, 2);
            assert_eq!(summary.goals, 3);
            assert_eq!(summary.journal_entries, 1);
            assert_eq!(summary.dependencies, 1);
            assert_eq!(summary.skipped, 0);

            let ws = target.workspace_by_slug("home").unwrap().expect("imported workspace");
            assert_ne!(ws.id, seeded.workspace.id);

            let parent = goal_named(&target, "Ship it");
            let child = goal_named(&target, "Write notes");
            let blocker = goal_named(&target, "Fix build");
            assert_eq!(child.parent_id, Some(parent.id));
            assert_eq!(child.sprint_id, parent.sprint_id);
            assert_eq!(parent.tags, vec!["release"]);
            assert_eq!(parent.recurrence_rule.as_deref(), Some("weekly:fri"));
            assert!(target.dependencies(child.id).unwrap().contains(&blocker.id));
            assert!(target.is_blocked(child.id).unwrap());

            let sprint_id = parent.sprint_id.expect("planned into a sprint");
            assert_eq!(target.get_sprint(sprint_id).unwrap().workspace_id, ws.id);
            let day = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
            let entries = target.journal_for_day(ws.id, day).unwrap();
            assert_eq!(entries[0].goal_id, Some(parent.id));
        }

        it "bring active sprints in paused" {
            let payload = export_vault(&source, &ExportOptions::default()).unwrap();
            import_vault(&target, &payload, None).unwrap();

            let ws = target.workspace_by_slug("home").unwrap().unwrap();
            assert!(target.active_sprint(ws.id).unwrap().is_none());
            let day = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
            let statuses: Vec<SprintStatus> = target.sprints_for_day(ws.id, day).unwrap()
                .into_iter().map(|s| s.status).collect();
            assert_eq!(statuses, vec![SprintStatus::Paused, SprintStatus::Pending]);
        }

        it "merge into an existing workspace with the same slug" {
            let payload = export_vault(&source, &ExportOptions::default()).unwrap();
            let summary = import_vault(&source, &payload, None).unwrap();

            assert_eq!(summary.workspaces_merged, 1);
            assert_eq!(summary.sprints_merged, 2);
            assert_eq!(source.list_workspaces().unwrap().len(), 1);
            assert_eq!(source.snapshot().unwrap().goals.len(), 6);
        }

        it "skip rows whose references are missing" {
            let payload = r#"{
                "app_version": "0.1.0",
                "exported_at": "2025-01-01T00:00:00Z",
                "journal_entries": [{
                    "id": "00000000-0000-0000-0000-000000000001",
                    "day_id": "00000000-0000-0000-0000-000000000002",
                    "workspace_id": "00000000-0000-0000-0000-000000000003",
                    "content": "orphan",
                    "created_at": "2025-01-01T00:00:00Z"
                }]
            }"#;
            let summary = import_vault(&target, payload, None).unwrap();
            assert_eq!(summary.skipped, 1);
            assert_eq!(summary.journal_entries, 0);
        }

        it "skip dependency edges that would close a cycle" {
            let child = goal_named(&source, "Write notes");
            let blocker = goal_named(&source, "Fix build");
            let payload = export_vault(&source, &ExportOptions::default()).unwrap();
            let mut doc: serde_json::Value = serde_json::from_str(&payload).unwrap();
            doc["task_deps"].as_array_mut().unwrap().push(serde_json::json!({
                "goal_id": blocker.id,
                "depends_on_id": child.id,
            }));

            let summary = import_vault(&target, &doc.to_string(), None).unwrap();
            assert_eq!(summary.dependencies, 1);
            assert_eq!(summary.skipped, 1);

            let child = goal_named(&target, "Write notes");
            let blocker = goal_named(&target, "Fix build");
            assert!(target.is_blocked(child.id).unwrap());
            assert!(!target.is_blocked(blocker.id).unwrap());
            assert!(target.dependencies(blocker.id).unwrap().is_empty());
        }

        it "skip self references and edges across workspaces" {
            let child = goal_named(&source, "Write notes");
            let work = source
                .create_workspace(CreateWorkspaceInput { name: "Work".to_string(), slug: None })
                .unwrap();
            let foreign = source
                .add_goal(CreateGoalInput::new("Elsewhere").in_workspace(work.id))
                .unwrap();
            let payload = export_vault(&source, &ExportOptions::default()).unwrap();
            let mut doc: serde_json::Value = serde_json::from_str(&payload).unwrap();
            let deps = doc["task_deps"].as_array_mut().unwrap();
            deps.push(serde_json::json!({ "goal_id": child.id, "depends_on_id": child.id }));
            deps.push(serde_json::json!({ "goal_id": child.id, "depends_on_id": foreign.id }));

            let summary = import_vault(&target, &doc.to_string(), None).unwrap();
            assert_eq!(summary.dependencies, 1);
            assert_eq!(summary.skipped, 2);
            let child = goal_named(&target, "Write notes");
            assert_eq!(target.dependencies(child.id).unwrap().len(), 1);
        }

        it "reject malformed payloads" {
            let err = import_vault(&target, "{not json", None).unwrap_err();
            assert!(matches!(err, StoreError::Json(_)));
        }
    }

    describe "sealed vaults" {
        it "round-trip with the right passphrase" {
            let payload = export_vault(&source, &ExportOptions::encrypted("vault key")).unwrap();
            assert!(!payload.contains("Ship it"));

            let summary = import_vault(&target, &payload, Some("vault key")).unwrap();
            assert_eq!(summary.goals, 3);
            assert_eq!(summary.dependencies, 1);
        }

        it "refuse a wrong or missing passphrase without touching the store" {
            let payload = export_vault(&source, &ExportOptions::encrypted("vault key")).unwrap();

            let err = import_vault(&target, &payload, Some("guess")).unwrap_err();
            assert!(err.is_passphrase_problem());
            let err = import_vault(&target, &payload, None).unwrap_err();
            assert!(matches!(err, StoreError::PassphraseRequired));
            assert!(target.list_workspaces().unwrap().is_empty());
        }

        it "use a fresh salt and nonce every time" {
            let first = export_vault(&source, &ExportOptions::encrypted("k")).unwrap();
            let second = export_vault(&source, &ExportOptions::encrypted("k")).unwrap();
            let first: serde_json::Value = serde_json::from_str(&first).unwrap();
            let second: serde_json::Value = serde_json::from_str(&second).unwrap();
            assert_ne!(first["salt"], second["salt"]);
            assert_ne!(first["nonce"], second["nonce"]);
        }
    }
}
