use super::*;
use sqlx::sqlite::SqlitePoolOptions;
use storyloom_replay::SceneRef;

async fn project_pool() -> sqlx::SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    for statement in [
        r#"CREATE TABLE characters (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            gender TEXT,
            age TEXT,
            romantic_challenge TEXT,
            lovable_trait TEXT,
            comedic_flaw TEXT,
            notes TEXT
        )"#,
        r#"CREATE TABLE story_outline (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            act INTEGER NOT NULL,
            scene INTEGER NOT NULL,
            key_characters TEXT,
            key_events TEXT
        )"#,
        r#"INSERT INTO characters (name, gender, age, romantic_challenge, lovable_trait, comedic_flaw)
           VALUES ('Emma', 'female', 32, 'Swore off dating after a public breakup', 'Fiercely loyal', 'Narrates her own life out loud'),
                  ('Jake', 'male', '34', NULL, 'Cooks for everyone', '')"#,
        r#"INSERT INTO story_outline (act, scene, key_characters, key_events)
           VALUES (2, 1, 'Emma', 'The fake engagement is announced'),
                  (1, 2, 'Emma, Jake', 'They fight over the last cab'),
                  (1, 1, ' emma ', 'Emma gets dumped at her sister''s wedding')"#,
    ] {
        sqlx::query(statement).execute(&pool).await.unwrap();
    }
    pool
}

#[test]
fn test_character_description() {
    let emma = CharacterSummary::new("Emma")
        .with_age("32")
        .with_gender("female")
        .with_challenge("Swore off dating.")
        .with_lovable_trait("Fiercely loyal")
        .with_flaw("Narrates her own life");
    assert_eq!(
        emma.describe(),
        "EMMA (32, female): Swore off dating. Lovable trait: Fiercely loyal. Comic flaw: Narrates her own life."
    );

    assert_eq!(CharacterSummary::new("Jake").describe(), "JAKE:");
}

#[test]
fn test_character_matching() {
    let emma = CharacterSummary::new("Emma");
    assert!(emma.matches("  emma "));
    assert!(emma.matches("EMMA"));
    assert!(!emma.matches("Emm"));
}

#[test]
fn test_outline_character_names() {
    let outline = SceneOutline::new(SceneRef::new(1, 1), " Emma,, Jake ,", "meet-cute");
    assert_eq!(outline.character_names().collect::<Vec<_>>(), vec!["Emma", "Jake"]);
}

#[tokio::test]
async fn test_sqlite_records() {
    let store = SqliteRecordStore::new(project_pool().await);

    let scenes = store.scenes().await.unwrap();
    assert_eq!(
        scenes,
        vec![SceneRef::new(1, 1), SceneRef::new(1, 2), SceneRef::new(2, 1)]
    );

    let outline = store.scene_outline(SceneRef::new(1, 2)).await.unwrap().unwrap();
    assert_eq!(outline.characters, "Emma, Jake");
    assert_eq!(outline.required_events, "They fight over the last cab");
    assert!(store.scene_outline(SceneRef::new(3, 1)).await.unwrap().is_none());

    let characters = store.characters().await.unwrap();
    assert_eq!(characters.len(), 2);
    assert_eq!(characters[0].age.as_deref(), Some("32"));
    assert_eq!(characters[1].challenge, None);
    assert_eq!(characters[1].flaw, None);
}

#[tokio::test]
async fn test_missing_tables_are_records_errors() {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let store = SqliteRecordStore::new(pool);

    let err = store.scenes().await.unwrap_err();
    assert!(matches!(err, crate::Error::Records(_)));
    assert!(err.is_session_fatal());
}

#[tokio::test]
async fn test_missing_project_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = SqliteRecordStore::from_path(&dir.path().join("absent.db")).await;
    assert!(matches!(result, Err(crate::Error::Records(_))));
}

#[tokio::test]
async fn test_in_memory_records() {
    let store = InMemoryRecordStore::new()
        .with_character(CharacterSummary::new("Emma"))
        .with_outline(SceneOutline::new(SceneRef::new(1, 2), "Emma", "b"))
        .with_outline(SceneOutline::new(SceneRef::new(1, 1), "Emma", "a"));

    assert_eq!(
        store.scenes().await.unwrap(),
        vec![SceneRef::new(1, 1), SceneRef::new(1, 2)]
    );
    assert_eq!(store.characters().await.unwrap().len(), 1);
}
