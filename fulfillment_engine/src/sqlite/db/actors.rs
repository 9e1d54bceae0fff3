use log::trace;
use mfb_common::{distance_km, Cents, Coordinates};
use sqlx::SqliteConnection;

use crate::{
    db_types::{ActorId, ActorProfile, CandidateActor, NewActor},
    traits::{ActorApiError, CandidateFilter},
};

const KM_PER_DEGREE_LAT: f64 = 111.0;

pub async fn upsert_actor(actor: &NewActor, conn: &mut SqliteConnection) -> Result<ActorProfile, ActorApiError> {
    let profile = sqlx::query_as(
        r#"
            INSERT INTO actors (actor_id, kind, display_name, latitude, longitude, is_available, service_categories)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (actor_id) DO UPDATE SET
                kind = excluded.kind,
                display_name = excluded.display_name,
                latitude = excluded.latitude,
                longitude = excluded.longitude,
                is_available = excluded.is_available,
                service_categories = excluded.service_categories,
                updated_at = CURRENT_TIMESTAMP
            RETURNING *;
        "#,
    )
    .bind(actor.actor_id.as_str())
    .bind(actor.kind)
    .bind(&actor.display_name)
    .bind(actor.location.latitude)
    .bind(actor.location.longitude)
    .bind(actor.is_available)
    .bind(&actor.service_categories)
    .fetch_one(conn)
    .await?;
    Ok(profile)
}

pub async fn fetch_actor(actor_id: &ActorId, conn: &mut SqliteConnection) -> Result<Option<ActorProfile>, ActorApiError> {
    let profile =
        sqlx::query_as("SELECT * FROM actors WHERE actor_id = $1").bind(actor_id.as_str()).fetch_optional(conn).await?;
    Ok(profile)
}

/// Geo-radius candidate query: a bounding-box prefilter in SQL, then the exact haversine cut and
/// nearest-first sort over the survivors. SQLite has no native geo index; the box keeps the row
/// count proportional to the search area.
pub async fn find_candidates(
    origin: Coordinates,
    radius_km: f64,
    filter: &CandidateFilter,
    conn: &mut SqliteConnection,
) -> Result<Vec<CandidateActor>, ActorApiError> {
    let d_lat = radius_km / KM_PER_DEGREE_LAT;
    let lat_cos = origin.latitude.to_radians().cos().abs().max(0.01);
    let d_lon = radius_km / (KM_PER_DEGREE_LAT * lat_cos);

    let mut builder = sqlx::QueryBuilder::new(
        "SELECT * FROM actors WHERE is_available = 1 AND latitude BETWEEN ",
    );
    builder.push_bind(origin.latitude - d_lat);
    builder.push(" AND ");
    builder.push_bind(origin.latitude + d_lat);
    builder.push(" AND longitude BETWEEN ");
    builder.push_bind(origin.longitude - d_lon);
    builder.push(" AND ");
    builder.push_bind(origin.longitude + d_lon);
    if let Some(kind) = filter.kind {
        builder.push(" AND kind = ");
        builder.push_bind(kind.to_string());
    }
    trace!("🧭️ Executing candidate query: {}", builder.sql());
    let rows: Vec<ActorProfile> = builder.build_query_as().fetch_all(conn).await?;

    let mut candidates: Vec<CandidateActor> = rows
        .into_iter()
        .filter(|actor| filter.category.as_deref().map(|c| actor.has_category(c)).unwrap_or(true))
        .filter(|actor| !filter.exclude.contains(&actor.actor_id))
        .filter_map(|actor| {
            let location = actor.location();
            let distance = distance_km(&origin, &location);
            (distance <= radius_km).then(|| CandidateActor {
                actor_id: actor.actor_id,
                kind: actor.kind,
                location,
                distance_km: distance,
            })
        })
        .collect();
    candidates.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    Ok(candidates)
}

pub async fn set_availability(
    actor_id: &ActorId,
    available: bool,
    conn: &mut SqliteConnection,
) -> Result<(), ActorApiError> {
    let result =
        sqlx::query("UPDATE actors SET is_available = $1, updated_at = CURRENT_TIMESTAMP WHERE actor_id = $2")
            .bind(available)
            .bind(actor_id.as_str())
            .execute(conn)
            .await?;
    if result.rows_affected() == 0 {
        return Err(ActorApiError::ActorNotFound(actor_id.clone()));
    }
    Ok(())
}

/// Atomic counter adjustment. Negative deltas clamp at zero matches (the guard prevents a double
/// release from driving the counter negative).
pub async fn adjust_assignments(
    actor_id: &ActorId,
    delta: i64,
    conn: &mut SqliteConnection,
) -> Result<bool, ActorApiError> {
    let result = if delta < 0 {
        sqlx::query(
            "UPDATE actors SET current_assignments = current_assignments + $1, updated_at = CURRENT_TIMESTAMP \
             WHERE actor_id = $2 AND current_assignments >= $3",
        )
        .bind(delta)
        .bind(actor_id.as_str())
        .bind(-delta)
        .execute(conn)
        .await?
    } else {
        sqlx::query(
            "UPDATE actors SET current_assignments = current_assignments + $1, updated_at = CURRENT_TIMESTAMP \
             WHERE actor_id = $2",
        )
        .bind(delta)
        .bind(actor_id.as_str())
        .execute(conn)
        .await?
    };
    Ok(result.rows_affected() > 0)
}

/// Completion bookkeeping: one fewer live assignment, one more completed order, earnings credited.
pub async fn record_completion(
    actor_id: &ActorId,
    earning: Cents,
    conn: &mut SqliteConnection,
) -> Result<(), ActorApiError> {
    let result = sqlx::query(
        "UPDATE actors SET \
             current_assignments = MAX(current_assignments - 1, 0), \
             completed_orders = completed_orders + 1, \
             total_earnings = total_earnings + $1, \
             updated_at = CURRENT_TIMESTAMP \
         WHERE actor_id = $2",
    )
    .bind(earning)
    .bind(actor_id.as_str())
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(ActorApiError::ActorNotFound(actor_id.clone()));
    }
    Ok(())
}
