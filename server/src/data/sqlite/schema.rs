//! SQLite schema definitions
//!
//! Initial schema with all catalog tables. Timestamps are UTC text in
//! `YYYY-MM-DD HH:MM:SS` form so they compare lexically; dates are
//! `YYYY-MM-DD`.

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Complete schema SQL
pub const SCHEMA: &str = r#"
-- =============================================================================
-- Infrastructure: Schema version tracking
-- =============================================================================
CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL,
    applied_at INTEGER NOT NULL,
    description TEXT
);

CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at INTEGER NOT NULL,
    checksum TEXT NOT NULL,
    execution_time_ms INTEGER,
    success INTEGER NOT NULL DEFAULT 1
);

-- =============================================================================
-- 1. Blobs (content addressed by MD5, referenced by image columns)
-- =============================================================================
CREATE TABLE IF NOT EXISTS blobs (
    checksum TEXT PRIMARY KEY NOT NULL,
    blob BLOB
);

-- =============================================================================
-- 2. Files
-- =============================================================================
CREATE TABLE IF NOT EXISTS folders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE,
    parent_folder_id INTEGER REFERENCES folders(id) ON DELETE SET NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    basename TEXT NOT NULL,
    parent_folder_id INTEGER NOT NULL REFERENCES folders(id),
    zip_file_id INTEGER REFERENCES files(id),
    size INTEGER NOT NULL DEFAULT 0,
    mod_time TEXT,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (parent_folder_id, basename)
);

CREATE TABLE IF NOT EXISTS files_fingerprints (
    file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    type TEXT NOT NULL,
    fingerprint TEXT NOT NULL,
    PRIMARY KEY (file_id, type)
);
CREATE INDEX IF NOT EXISTS idx_fingerprints_value ON files_fingerprints(type, fingerprint);

CREATE TABLE IF NOT EXISTS video_files (
    file_id INTEGER PRIMARY KEY REFERENCES files(id) ON DELETE CASCADE,
    duration REAL NOT NULL DEFAULT 0,
    video_codec TEXT,
    format TEXT,
    width INTEGER NOT NULL DEFAULT 0,
    height INTEGER NOT NULL DEFAULT 0,
    frame_rate REAL,
    bit_rate INTEGER,
    interactive INTEGER NOT NULL DEFAULT 0,
    interactive_speed INTEGER
);

CREATE TABLE IF NOT EXISTS video_captions (
    file_id INTEGER NOT NULL REFERENCES video_files(file_id) ON DELETE CASCADE,
    language_code TEXT NOT NULL,
    filename TEXT NOT NULL,
    caption_type TEXT NOT NULL,
    PRIMARY KEY (file_id, language_code, caption_type)
);

CREATE TABLE IF NOT EXISTS image_files (
    file_id INTEGER PRIMARY KEY REFERENCES files(id) ON DELETE CASCADE,
    format TEXT,
    width INTEGER NOT NULL DEFAULT 0,
    height INTEGER NOT NULL DEFAULT 0
);

-- =============================================================================
-- 3. Tags
-- =============================================================================
CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    favorite INTEGER NOT NULL DEFAULT 0,
    ignore_auto_tag INTEGER NOT NULL DEFAULT 0,
    image_blob TEXT REFERENCES blobs(checksum),
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS tag_aliases (
    tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
    alias TEXT NOT NULL,
    PRIMARY KEY (tag_id, alias)
);

CREATE TABLE IF NOT EXISTS tags_relations (
    parent_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
    child_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
    PRIMARY KEY (parent_id, child_id)
);
CREATE INDEX IF NOT EXISTS idx_tags_relations_child ON tags_relations(child_id);

-- =============================================================================
-- 4. Studios
-- =============================================================================
CREATE TABLE IF NOT EXISTS studios (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    url TEXT,
    parent_id INTEGER REFERENCES studios(id) ON DELETE SET NULL,
    rating INTEGER,
    favorite INTEGER NOT NULL DEFAULT 0,
    details TEXT,
    ignore_auto_tag INTEGER NOT NULL DEFAULT 0,
    image_blob TEXT REFERENCES blobs(checksum),
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_studios_parent ON studios(parent_id);

CREATE TABLE IF NOT EXISTS studio_aliases (
    studio_id INTEGER NOT NULL REFERENCES studios(id) ON DELETE CASCADE,
    alias TEXT NOT NULL,
    PRIMARY KEY (studio_id, alias)
);

CREATE TABLE IF NOT EXISTS studios_tags (
    studio_id INTEGER NOT NULL REFERENCES studios(id) ON DELETE CASCADE,
    tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
    PRIMARY KEY (studio_id, tag_id)
);

CREATE TABLE IF NOT EXISTS studio_stash_ids (
    studio_id INTEGER NOT NULL REFERENCES studios(id) ON DELETE CASCADE,
    endpoint TEXT NOT NULL,
    stash_id TEXT NOT NULL
);

-- =============================================================================
-- 5. Performers
-- =============================================================================
CREATE TABLE IF NOT EXISTS performers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    disambiguation TEXT,
    gender TEXT,
    url TEXT,
    birthdate TEXT,
    death_date TEXT,
    ethnicity TEXT,
    country TEXT,
    eye_color TEXT,
    hair_color TEXT,
    height INTEGER,
    weight INTEGER,
    measurements TEXT,
    fake_tits TEXT,
    penis_length REAL,
    circumcised TEXT,
    career_length TEXT,
    tattoos TEXT,
    piercings TEXT,
    favorite INTEGER NOT NULL DEFAULT 0,
    rating INTEGER,
    details TEXT,
    ignore_auto_tag INTEGER NOT NULL DEFAULT 0,
    image_blob TEXT REFERENCES blobs(checksum),
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS performer_aliases (
    performer_id INTEGER NOT NULL REFERENCES performers(id) ON DELETE CASCADE,
    alias TEXT NOT NULL,
    PRIMARY KEY (performer_id, alias)
);

CREATE TABLE IF NOT EXISTS performers_tags (
    performer_id INTEGER NOT NULL REFERENCES performers(id) ON DELETE CASCADE,
    tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
    PRIMARY KEY (performer_id, tag_id)
);

CREATE TABLE IF NOT EXISTS performer_stash_ids (
    performer_id INTEGER NOT NULL REFERENCES performers(id) ON DELETE CASCADE,
    endpoint TEXT NOT NULL,
    stash_id TEXT NOT NULL
);

-- =============================================================================
-- 6. Scenes
-- =============================================================================
CREATE TABLE IF NOT EXISTS scenes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT,
    code TEXT,
    details TEXT,
    director TEXT,
    date TEXT,
    rating INTEGER,
    organized INTEGER NOT NULL DEFAULT 0,
    o_counter INTEGER NOT NULL DEFAULT 0,
    studio_id INTEGER REFERENCES studios(id) ON DELETE SET NULL,
    resume_time REAL NOT NULL DEFAULT 0,
    play_duration REAL NOT NULL DEFAULT 0,
    play_count INTEGER NOT NULL DEFAULT 0,
    cover_blob TEXT REFERENCES blobs(checksum),
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_scenes_studio ON scenes(studio_id);

CREATE TABLE IF NOT EXISTS scene_urls (
    scene_id INTEGER NOT NULL REFERENCES scenes(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    url TEXT NOT NULL,
    PRIMARY KEY (scene_id, position, url)
);

CREATE TABLE IF NOT EXISTS scenes_files (
    scene_id INTEGER NOT NULL REFERENCES scenes(id) ON DELETE CASCADE,
    file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    "primary" INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (scene_id, file_id)
);

CREATE TABLE IF NOT EXISTS scene_markers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scene_id INTEGER NOT NULL REFERENCES scenes(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    seconds REAL NOT NULL,
    primary_tag_id INTEGER NOT NULL REFERENCES tags(id),
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS scenes_tags (
    scene_id INTEGER NOT NULL REFERENCES scenes(id) ON DELETE CASCADE,
    tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
    PRIMARY KEY (scene_id, tag_id)
);
CREATE INDEX IF NOT EXISTS idx_scenes_tags_tag ON scenes_tags(tag_id);

CREATE TABLE IF NOT EXISTS performers_scenes (
    performer_id INTEGER NOT NULL REFERENCES performers(id) ON DELETE CASCADE,
    scene_id INTEGER NOT NULL REFERENCES scenes(id) ON DELETE CASCADE,
    PRIMARY KEY (scene_id, performer_id)
);
CREATE INDEX IF NOT EXISTS idx_performers_scenes_performer ON performers_scenes(performer_id);

CREATE TABLE IF NOT EXISTS scene_stash_ids (
    scene_id INTEGER NOT NULL REFERENCES scenes(id) ON DELETE CASCADE,
    endpoint TEXT NOT NULL,
    stash_id TEXT NOT NULL
);

-- =============================================================================
-- 7. Images
-- =============================================================================
CREATE TABLE IF NOT EXISTS images (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT,
    code TEXT,
    details TEXT,
    photographer TEXT,
    date TEXT,
    rating INTEGER,
    organized INTEGER NOT NULL DEFAULT 0,
    o_counter INTEGER NOT NULL DEFAULT 0,
    studio_id INTEGER REFERENCES studios(id) ON DELETE SET NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS image_urls (
    image_id INTEGER NOT NULL REFERENCES images(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    url TEXT NOT NULL,
    PRIMARY KEY (image_id, position, url)
);

CREATE TABLE IF NOT EXISTS images_files (
    image_id INTEGER NOT NULL REFERENCES images(id) ON DELETE CASCADE,
    file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    "primary" INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (image_id, file_id)
);

CREATE TABLE IF NOT EXISTS images_tags (
    image_id INTEGER NOT NULL REFERENCES images(id) ON DELETE CASCADE,
    tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
    PRIMARY KEY (image_id, tag_id)
);

CREATE TABLE IF NOT EXISTS performers_images (
    performer_id INTEGER NOT NULL REFERENCES performers(id) ON DELETE CASCADE,
    image_id INTEGER NOT NULL REFERENCES images(id) ON DELETE CASCADE,
    PRIMARY KEY (image_id, performer_id)
);

-- =============================================================================
-- 8. Galleries
-- =============================================================================
CREATE TABLE IF NOT EXISTS galleries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    folder_id INTEGER REFERENCES folders(id) ON DELETE SET NULL,
    title TEXT,
    code TEXT,
    details TEXT,
    photographer TEXT,
    date TEXT,
    rating INTEGER,
    organized INTEGER NOT NULL DEFAULT 0,
    studio_id INTEGER REFERENCES studios(id) ON DELETE SET NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS gallery_urls (
    gallery_id INTEGER NOT NULL REFERENCES galleries(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    url TEXT NOT NULL,
    PRIMARY KEY (gallery_id, position, url)
);

CREATE TABLE IF NOT EXISTS galleries_files (
    gallery_id INTEGER NOT NULL REFERENCES galleries(id) ON DELETE CASCADE,
    file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    "primary" INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (gallery_id, file_id)
);

CREATE TABLE IF NOT EXISTS galleries_images (
    gallery_id INTEGER NOT NULL REFERENCES galleries(id) ON DELETE CASCADE,
    image_id INTEGER NOT NULL REFERENCES images(id) ON DELETE CASCADE,
    PRIMARY KEY (gallery_id, image_id)
);

CREATE TABLE IF NOT EXISTS galleries_tags (
    gallery_id INTEGER NOT NULL REFERENCES galleries(id) ON DELETE CASCADE,
    tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
    PRIMARY KEY (gallery_id, tag_id)
);

CREATE TABLE IF NOT EXISTS performers_galleries (
    performer_id INTEGER NOT NULL REFERENCES performers(id) ON DELETE CASCADE,
    gallery_id INTEGER NOT NULL REFERENCES galleries(id) ON DELETE CASCADE,
    PRIMARY KEY (gallery_id, performer_id)
);

CREATE TABLE IF NOT EXISTS scenes_galleries (
    scene_id INTEGER NOT NULL REFERENCES scenes(id) ON DELETE CASCADE,
    gallery_id INTEGER NOT NULL REFERENCES galleries(id) ON DELETE CASCADE,
    PRIMARY KEY (scene_id, gallery_id)
);

CREATE TABLE IF NOT EXISTS galleries_chapters (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    gallery_id INTEGER NOT NULL REFERENCES galleries(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    image_index INTEGER NOT NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

-- =============================================================================
-- 9. Groups
-- =============================================================================
CREATE TABLE IF NOT EXISTS groups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    aliases TEXT,
    duration INTEGER,
    date TEXT,
    rating INTEGER,
    studio_id INTEGER REFERENCES studios(id) ON DELETE SET NULL,
    director TEXT,
    synopsis TEXT,
    front_image_blob TEXT REFERENCES blobs(checksum),
    back_image_blob TEXT REFERENCES blobs(checksum),
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS group_urls (
    group_id INTEGER NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    url TEXT NOT NULL,
    PRIMARY KEY (group_id, position, url)
);

CREATE TABLE IF NOT EXISTS groups_relations (
    containing_id INTEGER NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
    sub_id INTEGER NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
    order_index INTEGER NOT NULL DEFAULT 0,
    description TEXT,
    PRIMARY KEY (containing_id, sub_id)
);
CREATE INDEX IF NOT EXISTS idx_groups_relations_sub ON groups_relations(sub_id);

CREATE TABLE IF NOT EXISTS groups_scenes (
    group_id INTEGER NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
    scene_id INTEGER NOT NULL REFERENCES scenes(id) ON DELETE CASCADE,
    scene_index INTEGER,
    PRIMARY KEY (group_id, scene_id)
);

CREATE TABLE IF NOT EXISTS groups_tags (
    group_id INTEGER NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
    tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
    PRIMARY KEY (group_id, tag_id)
);
"#;
