//! Postgres store against a live database
//!
//! Run with `DATABASE_URL=postgres://... cargo test -- --ignored`. The test
//! truncates the `food` table, so point it at a scratch database.

use chrono::NaiveDate;
use fridge_expiry::domain::{ExpiryQuery, FoodId, FreshnessUpdate, RefreshId};
use fridge_expiry::io::{FoodStore, PgFoodStore, StoreError};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn query() -> ExpiryQuery {
    ExpiryQuery {
        today: date(2024, 5, 10),
        horizon: date(2024, 5, 13),
        warning_category: RefreshId::WARNING,
        danger_category: RefreshId::DANGER,
    }
}

async fn seeded_store(database_url: &str) -> PgFoodStore {
    let store = PgFoodStore::connect(database_url, 2).await.unwrap();
    store.run_migrations().await.unwrap();
    sqlx::query("TRUNCATE food RESTART IDENTITY")
        .execute(store.pool())
        .await
        .unwrap();

    // (id, name, refrigerator, category, expiration)
    let rows = [
        (1_i64, "milk", 2_i64, RefreshId::NORMAL, date(2024, 5, 10)),
        (2, "eggs", 1, RefreshId::NORMAL, date(2024, 5, 13)),
        (3, "cheese", 1, RefreshId::NORMAL, date(2024, 5, 14)),
        (4, "yogurt", 1, RefreshId::NORMAL, date(2024, 5, 9)),
        (5, "tofu", 2, RefreshId::WARNING, date(2024, 5, 8)),
        (6, "ham", 1, RefreshId::DANGER, date(2024, 5, 1)),
    ];
    for (id, name, refrigerator_id, refresh, expiration_date) in rows {
        sqlx::query(
            "INSERT INTO food (food_id, name, refrigerator_id, refresh_id, registered_date, expiration_date) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(id)
        .bind(name)
        .bind(refrigerator_id)
        .bind(refresh.0)
        .bind(date(2024, 5, 1))
        .bind(expiration_date)
        .execute(store.pool())
        .await
        .unwrap();
    }
    store
}

// Single test function: every step shares the one `food` table.
#[tokio::test]
#[ignore = "requires DATABASE_URL pointing at a scratch Postgres database"]
async fn test_postgres_store_against_live_database() {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };
    let store = seeded_store(&database_url).await;
    let q = query();

    // window bounds are inclusive on both ends; reclassified rows are excluded
    let warning: Vec<FoodId> =
        store.find_warning_candidates(&q).await.unwrap().into_iter().map(|i| i.id).collect();
    assert_eq!(warning, vec![FoodId(1), FoodId(2)]);

    let danger = store.find_danger_candidates(&q).await.unwrap();
    assert_eq!(danger, vec![FoodId(4), FoodId(5)]);

    let items = store.find_items_by_ids(&[FoodId(5), FoodId(99), FoodId(1)]).await.unwrap();
    let ids: Vec<FoodId> = items.iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![FoodId(1), FoodId(5)]);
    assert!(store.find_items_by_ids(&[]).await.unwrap().is_empty());

    let danger_category = store.find_refresh_category(RefreshId::DANGER).await.unwrap().unwrap();
    assert_eq!(danger_category.name, "danger");
    assert!(store.find_refresh_category(RefreshId(99)).await.unwrap().is_none());

    // prev_refresh_id takes the value the row holds at commit time
    store
        .commit_freshness_updates(&[FreshnessUpdate::new(FoodId(1), RefreshId::WARNING)])
        .await
        .unwrap();
    store
        .commit_freshness_updates(&[FreshnessUpdate::new(FoodId(1), RefreshId::DANGER)])
        .await
        .unwrap();
    let milk = store.find_items_by_ids(&[FoodId(1)]).await.unwrap().remove(0);
    assert_eq!((milk.refresh, milk.prev_refresh), (RefreshId::DANGER, Some(RefreshId::WARNING)));

    // notices carry the category name and are ordered by refrigerator, then id
    let notices = store.find_notification_items(&[FoodId(1), FoodId(4), FoodId(99)]).await.unwrap();
    let summary: Vec<(FoodId, &str)> =
        notices.iter().map(|n| (n.food_id, n.refresh_name.as_str())).collect();
    assert_eq!(summary, vec![(FoodId(4), "normal"), (FoodId(1), "danger")]);

    // an unknown target category violates the foreign key and rolls back the whole batch
    let err = store
        .commit_freshness_updates(&[
            FreshnessUpdate::new(FoodId(2), RefreshId::WARNING),
            FreshnessUpdate::new(FoodId(4), RefreshId(99)),
        ])
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Database(_)));
    let eggs = store.find_items_by_ids(&[FoodId(2)]).await.unwrap().remove(0);
    assert_eq!((eggs.refresh, eggs.prev_refresh), (RefreshId::NORMAL, None));
}
