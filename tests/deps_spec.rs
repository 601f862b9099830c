use goalstack::db::{Database, StoreError};
use goalstack::models::*;
use speculate2::speculate;
use uuid::Uuid;

fn create_workspace(db: &Database, name: &str) -> Workspace {
    db.create_workspace(CreateWorkspaceInput {
        name: name.to_string(),
        slug: None,
    })
    .expect("Failed to create workspace")
}

fn add_goal(db: &Database, workspace: &Workspace, description: &str) -> Uuid {
    db.add_goal(CreateGoalInput::new(description).in_workspace(workspace.id))
        .expect("Failed to create goal")
        .id
}

speculate! {
    before {
        let db = Database::open_memory().expect("Failed to create in-memory database");
        let ws = create_workspace(&db, "Home");
        let a = add_goal(&db, &ws, "A");
        let b = add_goal(&db, &ws, "B");
        let c = add_goal(&db, &ws, "C");
    }

    describe "add_dependency" {
        it "records the edge and blocks the dependent goal" {
            db.add_dependency(a, b).unwrap();
            assert!(db.dependencies(a).unwrap().contains(&b));
            assert!(db.is_blocked(a).unwrap());
            assert!(!db.is_blocked(b).unwrap());
            assert!(db.blocked_goal_ids(ws.id).unwrap().contains(&a));
        }

        it "is a no-op for an existing edge" {
            db.add_dependency(a, b).unwrap();
            db.add_dependency(a, b).unwrap();
            assert_eq!(db.dependencies(a).unwrap().len(), 1);
        }

        it "rejects a self reference" {
            let err = db.add_dependency(a, a).unwrap_err();
            assert!(err.is_circular_dependency());
        }

        it "rejects an edge that closes a cycle and keeps the graph" {
            db.add_dependency(a, b).unwrap();
            db.add_dependency(b, c).unwrap();

            let err = db.add_dependency(c, a).unwrap_err();
            assert!(err.is_circular_dependency());
            assert!(matches!(
                err.cause(),
                StoreError::CircularDependency { goal, depends_on } if *goal == c && *depends_on == a
            ));
            assert!(db.dependencies(c).unwrap().is_empty());
            assert_eq!(db.dependencies(a).unwrap().len(), 1);
            assert_eq!(db.dependencies(b).unwrap().len(), 1);
        }

        it "allows diamonds" {
            let d = add_goal(&db, &ws, "D");
            db.add_dependency(a, b).unwrap();
            db.add_dependency(a, c).unwrap();
            db.add_dependency(b, d).unwrap();
            db.add_dependency(c, d).unwrap();
            assert_eq!(db.dependencies(a).unwrap().len(), 2);
        }

        it "rejects edges across workspaces" {
            let other = create_workspace(&db, "Work");
            let foreign = add_goal(&db, &other, "Foreign");
            let err = db.add_dependency(a, foreign).unwrap_err();
            assert!(matches!(err.cause(), StoreError::Validation { field: "depends_on", .. }));
        }

        it "reports a missing goal" {
            let err = db.add_dependency(a, Uuid::new_v4()).unwrap_err();
            assert!(err.is_not_found());
        }
    }

    describe "blocking" {
        it "clears once every dependency is completed" {
            db.add_dependency(a, b).unwrap();
            db.add_dependency(a, c).unwrap();

            db.set_goal_status(b, GoalStatus::Completed).unwrap();
            assert!(db.is_blocked(a).unwrap());

            db.set_goal_status(c, GoalStatus::Completed).unwrap();
            assert!(!db.is_blocked(a).unwrap());
        }

        it "stays while a dependency is only archived" {
            db.add_dependency(a, b).unwrap();
            db.archive_goal(b).unwrap();
            assert!(db.is_blocked(a).unwrap());
        }
    }

    describe "remove_dependency" {
        it "removes one edge and ignores missing ones" {
            db.add_dependency(a, b).unwrap();
            db.remove_dependency(a, b).unwrap();
            db.remove_dependency(a, b).unwrap();
            assert!(db.dependencies(a).unwrap().is_empty());
        }

        it "goes away when a goal is deleted" {
            db.add_dependency(a, b).unwrap();
            db.delete_goal(b).unwrap();
            assert!(db.dependencies(a).unwrap().is_empty());
            assert!(!db.is_blocked(a).unwrap());
        }
    }

    describe "set_dependencies" {
        it "replaces the edge set and skips invalid targets" {
            let other = create_workspace(&db, "Work");
            let foreign = add_goal(&db, &other, "Foreign");
            db.add_dependency(a, b).unwrap();

            let kept = db.set_dependencies(a, &[c, a, foreign, Uuid::new_v4()]).unwrap();
            assert_eq!(kept.into_iter().collect::<Vec<_>>(), vec![c]);
            assert!(!db.dependencies(a).unwrap().contains(&b));
        }

        it "keeps the previous edges when the new set has a cycle" {
            db.add_dependency(b, a).unwrap();
            db.add_dependency(a, c).unwrap();

            let err = db.set_dependencies(a, &[b]).unwrap_err();
            assert!(err.is_circular_dependency());
            assert_eq!(db.dependencies(a).unwrap().into_iter().collect::<Vec<_>>(), vec![c]);
        }
    }
}
