//! Category queries. Stories in a category are listed through
//! [`super::stories::list`] with a category filter.

use sqlx::PgPool;
use uuid::Uuid;

use super::models::Category;

const CATEGORY_COLUMNS: &str = "id, name, description, slug, created_at";

pub async fn list(pool: &PgPool) -> Result<Vec<Category>, sqlx::Error> {
    let sql = format!("SELECT {} FROM categories ORDER BY name", CATEGORY_COLUMNS);
    sqlx::query_as::<_, Category>(&sql).fetch_all(pool).await
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Category>, sqlx::Error> {
    let sql = format!("SELECT {} FROM categories WHERE id = $1", CATEGORY_COLUMNS);
    sqlx::query_as::<_, Category>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Existence check for a category using `$1` as name or `$2` as slug,
/// ignoring the category `$3` when set.
const CATEGORY_TAKEN: &str = "SELECT EXISTS(SELECT 1 FROM categories \
     WHERE (name = $1 OR slug = $2) AND ($3::uuid IS NULL OR id <> $3))";

/// True if another category already uses `name`, or a name that slugifies
/// to the same `slug`.
pub async fn taken(
    pool: &PgPool,
    name: &str,
    slug: &str,
    excluding: Option<Uuid>,
) -> Result<bool, sqlx::Error> {
    let (taken,): (bool,) = sqlx::query_as(CATEGORY_TAKEN)
        .bind(name)
        .bind(slug)
        .bind(excluding)
        .fetch_one(pool)
        .await?;
    Ok(taken)
}

pub async fn create(
    pool: &PgPool,
    name: &str,
    slug: &str,
    description: Option<&str>,
) -> Result<Category, sqlx::Error> {
    let sql = format!(
        "INSERT INTO categories (name, slug, description) VALUES ($1, $2, $3) RETURNING {}",
        CATEGORY_COLUMNS
    );
    sqlx::query_as::<_, Category>(&sql)
        .bind(name)
        .bind(slug)
        .bind(description)
        .fetch_one(pool)
        .await
}

/// Partial update; a new name also regenerates the slug.
pub async fn update(
    pool: &PgPool,
    id: Uuid,
    name: Option<&str>,
    slug: Option<&str>,
    description: Option<&str>,
) -> Result<Option<Category>, sqlx::Error> {
    let sql = format!(
        "UPDATE categories SET \
            name = COALESCE($2, name), \
            slug = COALESCE($3, slug), \
            description = COALESCE($4, description) \
         WHERE id = $1 RETURNING {}",
        CATEGORY_COLUMNS
    );
    sqlx::query_as::<_, Category>(&sql)
        .bind(id)
        .bind(name)
        .bind(slug)
        .bind(description)
        .fetch_optional(pool)
        .await
}

/// Delete a category along with its story links.
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM categories WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
