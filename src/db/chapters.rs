//! Chapter queries.

use sqlx::{PgConnection, PgExecutor, PgPool};
use uuid::Uuid;

use super::models::{Chapter, ChapterChanges, ChapterLink, ChapterSummary, NewChapter};
use crate::ordering::{self, ChapterSlot, Direction, MovePlan, MoveRejection};
use crate::pagination::Page;

const CHAPTER_COLUMNS: &str = "id, story_id, title, content, chapter_number, views, status, \
    created_by, created_at, updated_at";

const SUMMARY_COLUMNS: &str =
    "id, story_id, title, chapter_number, views, status, created_at, updated_at";

pub async fn list_for_story(
    pool: &PgPool,
    story_id: Uuid,
    page: Page,
) -> Result<(Vec<ChapterSummary>, i64), sqlx::Error> {
    let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chapters WHERE story_id = $1")
        .bind(story_id)
        .fetch_one(pool)
        .await?;

    let sql = format!(
        "SELECT {} FROM chapters WHERE story_id = $1 ORDER BY chapter_number LIMIT $2 OFFSET $3",
        SUMMARY_COLUMNS
    );
    let chapters = sqlx::query_as::<_, ChapterSummary>(&sql)
        .bind(story_id)
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(pool)
        .await?;

    Ok((chapters, total))
}

/// Full table of contents, in reading order.
pub async fn summaries_for_story(
    pool: &PgPool,
    story_id: Uuid,
) -> Result<Vec<ChapterSummary>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM chapters WHERE story_id = $1 ORDER BY chapter_number",
        SUMMARY_COLUMNS
    );
    sqlx::query_as::<_, ChapterSummary>(&sql)
        .bind(story_id)
        .fetch_all(pool)
        .await
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Chapter>, sqlx::Error> {
    let sql = format!("SELECT {} FROM chapters WHERE id = $1", CHAPTER_COLUMNS);
    sqlx::query_as::<_, Chapter>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Chapter of `story_id` holding `number`, ignoring `excluding`.
pub async fn find_by_number<'e, E: PgExecutor<'e>>(
    executor: E,
    story_id: Uuid,
    number: i32,
    excluding: Option<Uuid>,
) -> Result<Option<ChapterSlot>, sqlx::Error> {
    let row: Option<(Uuid, i32)> = sqlx::query_as(
        r#"
        SELECT id, chapter_number FROM chapters
        WHERE story_id = $1 AND chapter_number = $2 AND ($3::uuid IS NULL OR id <> $3)
        "#,
    )
    .bind(story_id)
    .bind(number)
    .bind(excluding)
    .fetch_optional(executor)
    .await?;
    Ok(row.map(|(id, chapter_number)| ChapterSlot { id, chapter_number }))
}

/// Recount a story's chapters from the table itself.
const REFRESH_TOTAL_CHAPTERS: &str = r#"
        UPDATE stories
        SET total_chapters = (SELECT COUNT(*) FROM chapters WHERE story_id = $1),
            updated_at = now()
        WHERE id = $1
        "#;

async fn refresh_total_chapters(conn: &mut PgConnection, story_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(REFRESH_TOTAL_CHAPTERS)
        .bind(story_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn create(pool: &PgPool, chapter: &NewChapter) -> Result<Chapter, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let sql = format!(
        "INSERT INTO chapters (story_id, title, content, chapter_number, status, created_by) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
        CHAPTER_COLUMNS
    );
    let created = sqlx::query_as::<_, Chapter>(&sql)
        .bind(chapter.story_id)
        .bind(&chapter.title)
        .bind(&chapter.content)
        .bind(chapter.chapter_number)
        .bind(chapter.status.as_str())
        .bind(chapter.created_by)
        .fetch_one(&mut *tx)
        .await?;

    refresh_total_chapters(&mut tx, chapter.story_id).await?;
    tx.commit().await?;

    tracing::debug!(chapter_id = %created.id, story_id = %created.story_id, number = created.chapter_number, "chapter created");
    Ok(created)
}

pub async fn update(
    pool: &PgPool,
    id: Uuid,
    changes: &ChapterChanges,
) -> Result<Option<Chapter>, sqlx::Error> {
    let sql = format!(
        "UPDATE chapters SET \
            title = COALESCE($2, title), \
            content = COALESCE($3, content), \
            chapter_number = COALESCE($4, chapter_number), \
            status = COALESCE($5, status), \
            updated_at = now() \
         WHERE id = $1 RETURNING {}",
        CHAPTER_COLUMNS
    );
    sqlx::query_as::<_, Chapter>(&sql)
        .bind(id)
        .bind(&changes.title)
        .bind(&changes.content)
        .bind(changes.chapter_number)
        .bind(changes.status.map(|s| s.as_str()))
        .fetch_optional(pool)
        .await
}

/// Delete a chapter and refresh its story's chapter count. Returns the
/// story id, or `None` if the chapter did not exist.
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<Option<Uuid>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let row: Option<(Uuid,)> = sqlx::query_as("DELETE FROM chapters WHERE id = $1 RETURNING story_id")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
    let Some((story_id,)) = row else {
        return Ok(None);
    };

    refresh_total_chapters(&mut tx, story_id).await?;
    tx.commit().await?;
    Ok(Some(story_id))
}

pub async fn record_view(pool: &PgPool, id: Uuid) -> Result<Option<i64>, sqlx::Error> {
    let row: Option<(i64,)> =
        sqlx::query_as("UPDATE chapters SET views = views + 1 WHERE id = $1 RETURNING views")
            .bind(id)
            .fetch_optional(pool)
            .await?;
    Ok(row.map(|(v,)| v))
}

/// Closest chapters before and after `number` in the same story.
pub async fn neighbours(
    pool: &PgPool,
    story_id: Uuid,
    number: i32,
) -> Result<(Option<ChapterLink>, Option<ChapterLink>), sqlx::Error> {
    let prev = sqlx::query_as::<_, ChapterLink>(
        r#"
        SELECT id, chapter_number, title FROM chapters
        WHERE story_id = $1 AND chapter_number < $2
        ORDER BY chapter_number DESC LIMIT 1
        "#,
    )
    .bind(story_id)
    .bind(number)
    .fetch_optional(pool)
    .await?;

    let next = sqlx::query_as::<_, ChapterLink>(
        r#"
        SELECT id, chapter_number, title FROM chapters
        WHERE story_id = $1 AND chapter_number > $2
        ORDER BY chapter_number ASC LIMIT 1
        "#,
    )
    .bind(story_id)
    .bind(number)
    .fetch_optional(pool)
    .await?;

    Ok((prev, next))
}

#[derive(Debug)]
pub enum MoveOutcome {
    NotFound,
    Rejected(MoveRejection),
    Applied(MovePlan),
}

/// Move a chapter one step. The chapter row is locked for the duration so
/// the occupant check and the write see the same numbering.
pub async fn move_chapter(
    pool: &PgPool,
    id: Uuid,
    direction: Direction,
    confirm_swap: bool,
) -> Result<MoveOutcome, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let row: Option<(Uuid, i32)> =
        sqlx::query_as("SELECT story_id, chapter_number FROM chapters WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
    let Some((story_id, chapter_number)) = row else {
        return Ok(MoveOutcome::NotFound);
    };
    let mover = ChapterSlot { id, chapter_number };

    let target = match ordering::target_number(chapter_number, direction) {
        Ok(target) => target,
        Err(rejection) => return Ok(MoveOutcome::Rejected(rejection)),
    };
    let occupant = find_by_number(&mut *tx, story_id, target, Some(id)).await?;

    let plan = match ordering::plan_move(mover, direction, occupant, confirm_swap) {
        Ok(plan) => plan,
        Err(rejection) => return Ok(MoveOutcome::Rejected(rejection)),
    };

    match plan {
        MovePlan::Renumber { id, to } => {
            sqlx::query("UPDATE chapters SET chapter_number = $2, updated_at = now() WHERE id = $1")
                .bind(id)
                .bind(to)
                .execute(&mut *tx)
                .await?;
        }
        MovePlan::Swap { mover, other } => {
            // One statement: the deferrable unique constraint is checked at
            // its end, after both rows have their new numbers.
            sqlx::query(
                r#"
                UPDATE chapters
                SET chapter_number = CASE id WHEN $1 THEN $2 WHEN $3 THEN $4 END,
                    updated_at = now()
                WHERE id IN ($1, $3)
                "#,
            )
            .bind(mover.id)
            .bind(mover.chapter_number)
            .bind(other.id)
            .bind(other.chapter_number)
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;
    tracing::info!(chapter_id = %id, story_id = %story_id, plan = ?plan, "chapter moved");
    Ok(MoveOutcome::Applied(plan))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_chapters_is_recounted_not_incremented() {
        let sql = REFRESH_TOTAL_CHAPTERS;
        assert!(sql.contains("SELECT COUNT(*) FROM chapters WHERE story_id = $1"));
        assert!(sql.contains("WHERE id = $1"));
        assert!(!sql.contains("total_chapters + 1"));
        assert!(!sql.contains("total_chapters - 1"));
    }
}
