//! Interactive obligation operations and mechanism sync

use chrono::NaiveDate;
use greenova_common::aggregate::sync_all_mechanisms;
use greenova_common::db::init_memory_database;
use greenova_common::models::ProjectRole;
use greenova_common::normalize::Vocabulary;
use greenova_common::repository::{ObligationRepository, SqliteRepository, UpsertOutcome};
use greenova_common::service::ObligationService;
use greenova_common::validate::{IdentifierRules, ObligationForm};
use greenova_common::{Error, Mechanism, Status};
use sqlx::SqlitePool;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn form(id: &str, mechanism: &str, status: &str) -> ObligationForm {
    ObligationForm {
        obligation_number: id.into(),
        project_name: "Portside".into(),
        mechanism_name: Some(mechanism.into()),
        obligation: "Install sediment fencing".into(),
        environmental_aspect: "Water".into(),
        status: status.into(),
        ..Default::default()
    }
}

async fn mechanism(pool: &SqlitePool, name: &str) -> Mechanism {
    let mut conn = pool.acquire().await.unwrap();
    let mut repo = SqliteRepository::new(&mut conn);
    let project = repo.find_project("Portside").await.unwrap().unwrap();
    repo.find_mechanism(project.id, name).await.unwrap().unwrap()
}

async fn setup() -> (SqlitePool, Vocabulary, IdentifierRules) {
    let pool = init_memory_database().await.unwrap();
    let vocab = Vocabulary::default();
    let ids = IdentifierRules::default();
    {
        let service = ObligationService::new(&pool, &vocab, &ids);
        service.create_project("Portside", Some("Port upgrade")).await.unwrap();
        service.create_mechanism("Portside", "CEMP").await.unwrap();
        service.create_mechanism("Portside", "EPL").await.unwrap();
    }
    (pool, vocab, ids)
}

#[tokio::test]
async fn test_submit_creates_and_recounts() {
    let (pool, vocab, ids) = setup().await;
    let service = ObligationService::new(&pool, &vocab, &ids);

    let (ob, outcome) = service.submit(&form("12", "CEMP", "in progress")).await.unwrap();
    assert_eq!(outcome, UpsertOutcome::Created);
    assert_eq!(ob.obligation_number, "PCEMP-12");

    let cemp = mechanism(&pool, "CEMP").await;
    assert_eq!(cemp.in_progress_count, 1);
    assert_eq!(cemp.status, Status::InProgress);
}

#[tokio::test]
async fn test_submit_completed_without_close_out_rejected() {
    let (pool, vocab, ids) = setup().await;
    let service = ObligationService::new(&pool, &vocab, &ids);

    let err = service
        .submit(&form("PCEMP-7", "CEMP", "completed"))
        .await
        .unwrap_err();
    match err {
        Error::Validation(errors) => assert!(errors.has("close_out_date")),
        other => panic!("expected validation error, got {:?}", other),
    }

    let mut conn = pool.acquire().await.unwrap();
    let mut repo = SqliteRepository::new(&mut conn);
    assert!(repo.find_by_id("PCEMP-7").await.unwrap().is_none());
}

#[tokio::test]
async fn test_submit_unknown_project_not_found() {
    let (pool, vocab, ids) = setup().await;
    let service = ObligationService::new(&pool, &vocab, &ids);

    let mut f = form("PCEMP-1", "CEMP", "not started");
    f.project_name = "Elsewhere".into();
    assert!(matches!(service.submit(&f).await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_edit_moving_mechanism_recounts_old_and_new() {
    let (pool, vocab, ids) = setup().await;
    let service = ObligationService::new(&pool, &vocab, &ids);

    service.submit(&form("PCEMP-1", "CEMP", "not started")).await.unwrap();
    service.submit(&form("PCEMP-2", "CEMP", "not started")).await.unwrap();

    let (_, outcome) = service.submit(&form("PCEMP-2", "EPL", "in progress")).await.unwrap();
    assert_eq!(outcome, UpsertOutcome::Updated);

    let cemp = mechanism(&pool, "CEMP").await;
    let epl = mechanism(&pool, "EPL").await;
    assert_eq!(cemp.total_obligations(), 1);
    assert_eq!(cemp.status, Status::NotStarted);
    assert_eq!(epl.in_progress_count, 1);
}

#[tokio::test]
async fn test_set_status_completed_needs_close_out_date() {
    let (pool, vocab, ids) = setup().await;
    let service = ObligationService::new(&pool, &vocab, &ids);
    service.submit(&form("PCEMP-1", "CEMP", "in progress")).await.unwrap();

    let err = service.set_status("PCEMP-1", "completed", None).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let ob = service
        .set_status("PCEMP-1", "Completed", Some(date(2025, 3, 1)))
        .await
        .unwrap();
    assert_eq!(ob.status, Status::Completed);

    let cemp = mechanism(&pool, "CEMP").await;
    assert_eq!(cemp.status, Status::Completed);
    assert_eq!(cemp.completed_count, 1);
}

#[tokio::test]
async fn test_set_status_rejects_unknown_status() {
    let (pool, vocab, ids) = setup().await;
    let service = ObligationService::new(&pool, &vocab, &ids);
    service.submit(&form("PCEMP-1", "CEMP", "in progress")).await.unwrap();

    let err = service.set_status("PCEMP-1", "done", None).await.unwrap_err();
    match err {
        Error::Validation(errors) => assert!(errors.has("status")),
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_reassign_and_detach() {
    let (pool, vocab, ids) = setup().await;
    let service = ObligationService::new(&pool, &vocab, &ids);
    service.submit(&form("PCEMP-1", "CEMP", "in progress")).await.unwrap();

    service.reassign("PCEMP-1", Some("EPL")).await.unwrap();
    assert_eq!(mechanism(&pool, "CEMP").await.total_obligations(), 0);
    assert_eq!(mechanism(&pool, "EPL").await.total_obligations(), 1);

    let ob = service.reassign("PCEMP-1", None).await.unwrap();
    assert_eq!(ob.mechanism_id, None);
    let epl = mechanism(&pool, "EPL").await;
    assert_eq!(epl.total_obligations(), 0);
    assert_eq!(epl.status, Status::NotStarted);

    let err = service.reassign("PCEMP-1", Some("Missing")).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_delete_recounts_mechanism() {
    let (pool, vocab, ids) = setup().await;
    let service = ObligationService::new(&pool, &vocab, &ids);
    service.submit(&form("PCEMP-1", "CEMP", "not started")).await.unwrap();

    let mut done = form("PCEMP-2", "CEMP", "completed");
    done.close_out_date = Some(date(2025, 2, 1));
    service.submit(&done).await.unwrap();
    assert_eq!(mechanism(&pool, "CEMP").await.status, Status::InProgress);

    service.delete("PCEMP-1").await.unwrap();
    let cemp = mechanism(&pool, "CEMP").await;
    assert_eq!(cemp.total_obligations(), 1);
    assert_eq!(cemp.status, Status::Completed);

    assert!(matches!(service.delete("PCEMP-1").await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_add_member_upserts_role() {
    let (pool, vocab, ids) = setup().await;
    let service = ObligationService::new(&pool, &vocab, &ids);

    service.add_member("Portside", "alex", ProjectRole::Member).await.unwrap();
    service.add_member("Portside", "alex", ProjectRole::Manager).await.unwrap();

    let mut conn = pool.acquire().await.unwrap();
    let mut repo = SqliteRepository::new(&mut conn);
    let project = repo.find_project("Portside").await.unwrap().unwrap();
    let members = repo.list_memberships(project.id).await.unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].role, ProjectRole::Manager);
}

#[tokio::test]
async fn test_duplicate_project_rejected() {
    let (pool, vocab, ids) = setup().await;
    let service = ObligationService::new(&pool, &vocab, &ids);
    let err = service.create_project("Portside", None).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[tokio::test]
async fn test_sync_repairs_statuses_and_counts() {
    let (pool, vocab, ids) = setup().await;
    {
        let service = ObligationService::new(&pool, &vocab, &ids);
        service.submit(&form("PCEMP-1", "CEMP", "in progress")).await.unwrap();
        service.submit(&form("PCEMP-2", "CEMP", "in progress")).await.unwrap();
        service.submit(&form("PCEMP-3", "CEMP", "in progress")).await.unwrap();
    }

    // Simulate data written outside the tool
    sqlx::query("UPDATE obligations SET status = 'Overdue' WHERE obligation_number = 'PCEMP-1'")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("UPDATE obligations SET status = NULL WHERE obligation_number = 'PCEMP-2'")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("UPDATE mechanisms SET completed_count = 9, status = 'completed'")
        .execute(&pool)
        .await
        .unwrap();

    let mut conn = pool.acquire().await.unwrap();
    let mut repo = SqliteRepository::new(&mut conn);
    let report = sync_all_mechanisms(&mut repo).await.unwrap();
    assert_eq!(report.statuses_reset, 2);
    assert_eq!(report.mechanisms_updated, 2);
    assert_eq!(report.mechanisms_failed, 0);

    let project = repo.find_project("Portside").await.unwrap().unwrap();
    let cemp = repo.find_mechanism(project.id, "CEMP").await.unwrap().unwrap();
    assert_eq!(cemp.not_started_count, 2);
    assert_eq!(cemp.in_progress_count, 1);
    assert_eq!(cemp.completed_count, 0);
    assert_eq!(cemp.status, Status::InProgress);

    let epl = repo.find_mechanism(project.id, "EPL").await.unwrap().unwrap();
    assert_eq!(epl.status, Status::NotStarted);
    assert_eq!(epl.total_obligations(), 0);
}
