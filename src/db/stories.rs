//! Story queries.

use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::models::{Category, NewStory, Story, StoryCard, StoryChanges, StoryStatus, StorySuggestion};
use crate::pagination::Page;
use crate::rating::RatingAggregate;
use crate::resolve::StoryLookup;
use crate::slug;

const STORY_COLUMNS: &str = "id, title, slug, author_id, description, cover_image, status, views, \
    total_chapters, rating_total, rating_count, rating_average, created_at, updated_at";

const CARD_SELECT: &str = "SELECT s.id, s.title, s.slug, s.author_id, s.description, s.cover_image, \
    s.status, s.views, s.total_chapters, s.rating_total, s.rating_count, s.rating_average, \
    s.created_at, s.updated_at, u.username AS author_username \
    FROM stories s LEFT JOIN users u ON u.id = s.author_id";

/// Filters for the catalogue listing.
#[derive(Debug, Clone, Default)]
pub struct StoryFilter {
    pub status: Option<StoryStatus>,
    /// Case-insensitive substring of the title.
    pub title: Option<String>,
    pub author_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
}

/// Whitelisted sort key for the catalogue listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorySort {
    column: &'static str,
    descending: bool,
}

impl Default for StorySort {
    fn default() -> Self {
        Self {
            column: "created_at",
            descending: true,
        }
    }
}

impl StorySort {
    /// Parse `field` or `-field`. Field names are accepted in camelCase or
    /// snake_case.
    pub fn parse(input: &str) -> Result<Self, String> {
        let (descending, field) = match input.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, input),
        };
        let column = match field {
            "title" => "title",
            "createdAt" | "created_at" => "created_at",
            "updatedAt" | "updated_at" => "updated_at",
            "views" => "views",
            "rating" | "ratingAverage" | "rating_average" => "rating_average",
            "totalChapters" | "total_chapters" => "total_chapters",
            "status" => "status",
            other => return Err(format!("Cannot sort by '{}'", other)),
        };
        Ok(Self { column, descending })
    }

    fn order_clause(&self) -> String {
        format!(
            " ORDER BY s.{} {}, s.id",
            self.column,
            if self.descending { "DESC" } else { "ASC" }
        )
    }
}

/// Fixed-order story rails shown on the home page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ranking {
    Featured,
    Trending,
    Latest,
    Completed,
}

impl Ranking {
    fn clause(&self) -> &'static str {
        match self {
            Ranking::Featured => " ORDER BY s.views DESC, s.created_at DESC",
            Ranking::Trending => " ORDER BY s.updated_at DESC, s.views DESC",
            Ranking::Latest => " ORDER BY s.created_at DESC",
            Ranking::Completed => " WHERE s.status = 'completed' ORDER BY s.updated_at DESC",
        }
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &StoryFilter) {
    qb.push(" WHERE TRUE");
    if let Some(status) = filter.status {
        qb.push(" AND s.status = ").push_bind(status.as_str());
    }
    if let Some(title) = filter.title.as_deref().filter(|t| !t.is_empty()) {
        qb.push(" AND s.title ~* ")
            .push_bind(slug::contains_pattern(title));
    }
    if let Some(author_id) = filter.author_id {
        qb.push(" AND s.author_id = ").push_bind(author_id);
    }
    if let Some(category_id) = filter.category_id {
        qb.push(" AND EXISTS (SELECT 1 FROM story_categories sc WHERE sc.story_id = s.id AND sc.category_id = ")
            .push_bind(category_id)
            .push(")");
    }
}

pub async fn list(
    pool: &PgPool,
    filter: &StoryFilter,
    sort: StorySort,
    page: Page,
) -> Result<(Vec<StoryCard>, i64), sqlx::Error> {
    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM stories s");
    push_filters(&mut count, filter);
    let (total,) = count.build_query_as::<(i64,)>().fetch_one(pool).await?;

    let mut qb = QueryBuilder::<Postgres>::new(CARD_SELECT);
    push_filters(&mut qb, filter);
    qb.push(sort.order_clause());
    qb.push(" LIMIT ").push_bind(page.limit);
    qb.push(" OFFSET ").push_bind(page.offset());
    let stories = qb.build_query_as::<StoryCard>().fetch_all(pool).await?;

    Ok((stories, total))
}

pub async fn ranked(pool: &PgPool, ranking: Ranking, limit: i64) -> Result<Vec<StoryCard>, sqlx::Error> {
    let sql = format!("{}{} LIMIT $1", CARD_SELECT, ranking.clause());
    sqlx::query_as::<_, StoryCard>(&sql)
        .bind(limit)
        .fetch_all(pool)
        .await
}

/// Stories whose title or description contains `q`, most viewed first.
pub async fn search(pool: &PgPool, q: &str, page: Page) -> Result<(Vec<StoryCard>, i64), sqlx::Error> {
    let pattern = slug::contains_pattern(q);

    let (total,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM stories s WHERE s.title ~* $1 OR s.description ~* $1",
    )
    .bind(&pattern)
    .fetch_one(pool)
    .await?;

    let sql = format!(
        "{} WHERE s.title ~* $1 OR s.description ~* $1 \
         ORDER BY s.views DESC, s.updated_at DESC LIMIT $2 OFFSET $3",
        CARD_SELECT
    );
    let stories = sqlx::query_as::<_, StoryCard>(&sql)
        .bind(&pattern)
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(pool)
        .await?;

    Ok((stories, total))
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Story>, sqlx::Error> {
    let sql = format!("SELECT {} FROM stories WHERE id = $1", STORY_COLUMNS);
    sqlx::query_as::<_, Story>(&sql).bind(id).fetch_optional(pool).await
}

pub async fn find_card_by_id(pool: &PgPool, id: Uuid) -> Result<Option<StoryCard>, sqlx::Error> {
    let sql = format!("{} WHERE s.id = $1", CARD_SELECT);
    sqlx::query_as::<_, StoryCard>(&sql).bind(id).fetch_optional(pool).await
}

pub async fn categories_of(pool: &PgPool, story_id: Uuid) -> Result<Vec<Category>, sqlx::Error> {
    sqlx::query_as::<_, Category>(
        r#"
        SELECT c.id, c.name, c.description, c.slug, c.created_at
        FROM categories c
        JOIN story_categories sc ON sc.category_id = c.id
        WHERE sc.story_id = $1
        ORDER BY c.name
        "#,
    )
    .bind(story_id)
    .fetch_all(pool)
    .await
}

/// Link `story_id` to the given categories, skipping unknown ids.
async fn link_categories(
    conn: &mut sqlx::PgConnection,
    story_id: Uuid,
    category_ids: &[Uuid],
) -> Result<(), sqlx::Error> {
    if category_ids.is_empty() {
        return Ok(());
    }
    sqlx::query(
        r#"
        INSERT INTO story_categories (story_id, category_id)
        SELECT $1, c.id FROM categories c WHERE c.id = ANY($2)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(story_id)
    .bind(category_ids)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn create(pool: &PgPool, story: &NewStory) -> Result<Story, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let sql = format!(
        "INSERT INTO stories (id, title, slug, author_id, description, cover_image, status) \
         VALUES ($1, $2, $3, $4, $5, COALESCE($6, 'default-cover.jpg'), $7) \
         RETURNING {}",
        STORY_COLUMNS
    );
    let created = sqlx::query_as::<_, Story>(&sql)
        .bind(story.id)
        .bind(&story.title)
        .bind(&story.slug)
        .bind(story.author_id)
        .bind(&story.description)
        .bind(&story.cover_image)
        .bind(story.status.as_str())
        .fetch_one(&mut *tx)
        .await?;

    link_categories(&mut tx, created.id, &story.category_ids).await?;
    tx.commit().await?;

    Ok(created)
}

pub async fn update(
    pool: &PgPool,
    id: Uuid,
    changes: &StoryChanges,
) -> Result<Option<Story>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let sql = format!(
        "UPDATE stories SET \
            title = COALESCE($2, title), \
            slug = COALESCE($3, slug), \
            description = COALESCE($4, description), \
            cover_image = COALESCE($5, cover_image), \
            status = COALESCE($6, status), \
            updated_at = now() \
         WHERE id = $1 RETURNING {}",
        STORY_COLUMNS
    );
    let updated = sqlx::query_as::<_, Story>(&sql)
        .bind(id)
        .bind(&changes.title)
        .bind(&changes.slug)
        .bind(&changes.description)
        .bind(&changes.cover_image)
        .bind(changes.status.map(|s| s.as_str()))
        .fetch_optional(&mut *tx)
        .await?;

    if updated.is_none() {
        return Ok(None);
    }

    if let Some(category_ids) = &changes.category_ids {
        sqlx::query("DELETE FROM story_categories WHERE story_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        link_categories(&mut tx, id, category_ids).await?;
    }

    tx.commit().await?;
    Ok(updated)
}

/// Delete a story; chapters, links, ratings, bookmarks and history go with it.
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM stories WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Assign every story without an author to `admin_id`.
pub async fn fix_missing_authors(pool: &PgPool, admin_id: Uuid) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE stories SET author_id = $1, updated_at = now() WHERE author_id IS NULL",
    )
    .bind(admin_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn user_rating(
    pool: &PgPool,
    story_id: Uuid,
    user_id: Uuid,
) -> Result<Option<i32>, sqlx::Error> {
    let row: Option<(i32,)> =
        sqlx::query_as("SELECT value FROM story_ratings WHERE story_id = $1 AND user_id = $2")
            .bind(story_id)
            .bind(user_id)
            .fetch_optional(pool)
            .await?;
    Ok(row.map(|(v,)| v))
}

/// Record `user_id`'s rating of a story and update the aggregate. `None`
/// when the story does not exist.
pub async fn rate(
    pool: &PgPool,
    story_id: Uuid,
    user_id: Uuid,
    value: i32,
) -> Result<Option<RatingAggregate>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let current: Option<(i64, i32)> = sqlx::query_as(
        "SELECT rating_total, rating_count FROM stories WHERE id = $1 FOR UPDATE",
    )
    .bind(story_id)
    .fetch_optional(&mut *tx)
    .await?;
    let Some((total, count)) = current else {
        return Ok(None);
    };

    let previous: Option<(i32,)> =
        sqlx::query_as("SELECT value FROM story_ratings WHERE story_id = $1 AND user_id = $2")
            .bind(story_id)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;

    sqlx::query(
        r#"
        INSERT INTO story_ratings (story_id, user_id, value)
        VALUES ($1, $2, $3)
        ON CONFLICT (story_id, user_id) DO UPDATE SET value = EXCLUDED.value, updated_at = now()
        "#,
    )
    .bind(story_id)
    .bind(user_id)
    .bind(value)
    .execute(&mut *tx)
    .await?;

    let aggregate = RatingAggregate::new(total, count).apply(previous.map(|(v,)| v), value);
    sqlx::query(
        "UPDATE stories SET rating_total = $2, rating_count = $3, rating_average = $4 WHERE id = $1",
    )
    .bind(story_id)
    .bind(aggregate.total)
    .bind(aggregate.count)
    .bind(aggregate.average)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(Some(aggregate))
}

/// [`StoryLookup`] backed by the stories table.
pub struct PgStoryLookup<'a> {
    pool: &'a PgPool,
}

impl<'a> PgStoryLookup<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }
}

impl StoryLookup for PgStoryLookup<'_> {
    async fn by_id(&self, id: Uuid) -> Result<Option<Story>, sqlx::Error> {
        find_by_id(self.pool, id).await
    }

    async fn by_slug_or_title(
        &self,
        slug: &str,
        title_pattern: &str,
        exact_title: &str,
    ) -> Result<Option<Story>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM stories WHERE slug = $1 OR title ~* $2 OR title = $3 \
             ORDER BY (slug = $1) DESC, (title = $3) DESC, created_at, id LIMIT 1",
            STORY_COLUMNS
        );
        sqlx::query_as::<_, Story>(&sql)
            .bind(slug)
            .bind(title_pattern)
            .bind(exact_title)
            .fetch_optional(self.pool)
            .await
    }

    async fn by_title_pattern(&self, pattern: &str) -> Result<Option<Story>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM stories WHERE title ~* $1 ORDER BY created_at, id LIMIT 1",
            STORY_COLUMNS
        );
        sqlx::query_as::<_, Story>(&sql)
            .bind(pattern)
            .fetch_optional(self.pool)
            .await
    }

    async fn similar(&self, pattern: &str, limit: i64) -> Result<Vec<StorySuggestion>, sqlx::Error> {
        sqlx::query_as::<_, StorySuggestion>(
            "SELECT id, title, slug FROM stories WHERE title ~* $1 ORDER BY created_at, id LIMIT $2",
        )
        .bind(pattern)
        .bind(limit)
        .fetch_all(self.pool)
        .await
    }

    async fn record_view(&self, id: Uuid) -> Result<Option<i64>, sqlx::Error> {
        let row: Option<(i64,)> =
            sqlx::query_as("UPDATE stories SET views = views + 1 WHERE id = $1 RETURNING views")
                .bind(id)
                .fetch_optional(self.pool)
                .await?;
        Ok(row.map(|(v,)| v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_parse_accepts_whitelisted_fields() {
        assert_eq!(
            StorySort::parse("-views").unwrap(),
            StorySort {
                column: "views",
                descending: true
            }
        );
        assert_eq!(
            StorySort::parse("createdAt").unwrap(),
            StorySort {
                column: "created_at",
                descending: false
            }
        );
        assert_eq!(StorySort::parse("rating").unwrap().column, "rating_average");
    }

    #[test]
    fn test_sort_parse_rejects_unknown_fields() {
        assert!(StorySort::parse("password_hash").is_err());
        assert!(StorySort::parse("views; DROP TABLE stories").is_err());
    }

    #[test]
    fn test_default_sort_is_newest_first() {
        assert_eq!(StorySort::default().order_clause(), " ORDER BY s.created_at DESC, s.id");
    }

    #[test]
    fn test_filters_bind_user_input() {
        let filter = StoryFilter {
            status: Some(StoryStatus::Completed),
            title: Some("o'brien".to_string()),
            author_id: Some(Uuid::nil()),
            category_id: None,
        };
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM stories s");
        push_filters(&mut qb, &filter);
        let sql = qb.sql();
        assert!(sql.contains("s.status = $1"));
        assert!(sql.contains("s.title ~* $2"));
        assert!(sql.contains("s.author_id = $3"));
        assert!(!sql.contains("o'brien"));
    }

    #[test]
    fn test_completed_ranking_filters_status() {
        assert!(Ranking::Completed.clause().contains("status = 'completed'"));
        assert!(Ranking::Featured.clause().starts_with(" ORDER BY s.views DESC"));
    }
}
