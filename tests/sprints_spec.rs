use chrono::NaiveDate;
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

speculate! {
    before {
        let db = Database::open_memory().expect("Failed to create in-memory database");
        let ws = create_workspace(&db, "Home");
        let day = NaiveDate::from_ymd_opt(2025, 3, 3).expect("valid date");
    }

    describe "bootstrap_sprints" {
        it "creates numbered pending sprints" {
            let sprints = db.bootstrap_sprints(ws.id, day, 4).unwrap();
            let numbers: Vec<u8> = sprints.iter().map(|s| s.sprint_number).collect();
            assert_eq!(numbers, vec![1, 2, 3, 4]);
            assert!(sprints.iter().all(|s| s.status == SprintStatus::Pending));
            assert!(sprints.iter().all(|s| s.workspace_id == ws.id));
        }

        it "is idempotent and only fills gaps" {
            let first = db.bootstrap_sprints(ws.id, day, 2).unwrap();
            let second = db.bootstrap_sprints(ws.id, day, 3).unwrap();
            assert_eq!(second.len(), 3);
            assert_eq!(second[0].id, first[0].id);
            assert_eq!(second[1].id, first[1].id);
        }

        it "keeps workspaces apart on the same day" {
            let other = create_workspace(&db, "Work");
            db.bootstrap_sprints(ws.id, day, 2).unwrap();
            db.bootstrap_sprints(other.id, day, 1).unwrap();
            assert_eq!(db.sprints_for_day(ws.id, day).unwrap().len(), 2);
            assert_eq!(db.sprints_for_day(other.id, day).unwrap().len(), 1);
        }

        it "rejects counts outside 1..=8" {
            for count in [0, MAX_SPRINTS_PER_DAY + 1] {
                let err = db.bootstrap_sprints(ws.id, day, count).unwrap_err();
                assert!(matches!(err.cause(), StoreError::Validation { field: "count", .. }));
            }
        }

        it "returns nothing for a day without sprints" {
            assert!(db.sprints_for_day(ws.id, day).unwrap().is_empty());
        }
    }

    describe "lifecycle" {
        it "starts, pauses, resumes and completes" {
            let sprint = db.bootstrap_sprints(ws.id, day, 1).unwrap().remove(0);

            let started = db.start_sprint(sprint.id).unwrap();
            assert_eq!(started.status, SprintStatus::Active);
            assert!(started.start_time.is_some());
            assert_eq!(db.active_sprint(ws.id).unwrap().map(|s| s.id), Some(sprint.id));

            let paused = db.pause_sprint(sprint.id).unwrap();
            assert_eq!(paused.status, SprintStatus::Paused);
            assert!(paused.last_paused_at.is_some());
            assert!(db.active_sprint(ws.id).unwrap().is_none());

            let resumed = db.resume_sprint(sprint.id).unwrap();
            assert_eq!(resumed.status, SprintStatus::Active);
            assert!(resumed.elapsed_seconds >= paused.elapsed_seconds);

            let completed = db.complete_sprint(sprint.id).unwrap();
            assert_eq!(completed.status, SprintStatus::Completed);
            assert!(completed.end_time.is_some());
            assert_eq!(db.get_sprint(sprint.id).unwrap().status, SprintStatus::Completed);
        }

        it "rejects invalid transitions" {
            let sprint = db.bootstrap_sprints(ws.id, day, 1).unwrap().remove(0);
            assert!(matches!(
                db.pause_sprint(sprint.id).unwrap_err().cause(),
                StoreError::Validation { field: "status", .. }
            ));
            assert!(db.resume_sprint(sprint.id).is_err());

            db.complete_sprint(sprint.id).unwrap();
            assert!(db.start_sprint(sprint.id).is_err());
            assert!(db.complete_sprint(sprint.id).is_err());
        }

        it "allows only one active sprint per workspace" {
            let sprints = db.bootstrap_sprints(ws.id, day, 2).unwrap();
            db.start_sprint(sprints[0].id).unwrap();

            let err = db.start_sprint(sprints[1].id).unwrap_err();
            assert!(matches!(
                err.cause(),
                StoreError::SprintAlreadyActive { active } if *active == sprints[0].id
            ));
            assert_eq!(db.get_sprint(sprints[1].id).unwrap().status, SprintStatus::Pending);

            db.pause_sprint(sprints[0].id).unwrap();
            db.start_sprint(sprints[1].id).unwrap();
            assert!(db.resume_sprint(sprints[0].id).is_err());
        }

        it "lets different workspaces run sprints at once" {
            let other = create_workspace(&db, "Work");
            let mine = db.bootstrap_sprints(ws.id, day, 1).unwrap().remove(0);
            let theirs = db.bootstrap_sprints(other.id, day, 1).unwrap().remove(0);
            db.start_sprint(mine.id).unwrap();
            db.start_sprint(theirs.id).unwrap();
        }

        it "reports a missing sprint" {
            assert!(db.start_sprint(Uuid::new_v4()).unwrap_err().is_not_found());
        }
    }
}
