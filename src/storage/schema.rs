//! Database schema definitions

/// Connection-level settings applied before any statement runs
pub const PRAGMAS: &str = "PRAGMA foreign_keys = ON;";

/// SQL to create the projects table
pub const CREATE_PROJECTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    description TEXT
)
"#;

/// SQL to create the authors table
pub const CREATE_AUTHORS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS authors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    affiliation TEXT
)
"#;

pub const CREATE_PROJECT_AUTHORS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS project_authors (
    project_id INTEGER NOT NULL REFERENCES projects(id) ON UPDATE CASCADE ON DELETE CASCADE,
    author_id INTEGER NOT NULL REFERENCES authors(id) ON UPDATE CASCADE ON DELETE CASCADE,
    PRIMARY KEY (project_id, author_id)
)
"#;

/// SQL to create the hosts table
pub const CREATE_HOSTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS hosts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    date TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
)
"#;

pub const CREATE_HOST_PROPERTIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS host_properties (
    host_id INTEGER NOT NULL REFERENCES hosts(id) ON UPDATE CASCADE ON DELETE CASCADE,
    keyword TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (host_id, keyword)
)
"#;

/// SQL to create the systems table
pub const CREATE_SYSTEMS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS systems (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    variant TEXT
)
"#;

pub const CREATE_SYSTEM_PROPERTIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS system_properties (
    system_id INTEGER NOT NULL REFERENCES systems(id) ON UPDATE CASCADE ON DELETE CASCADE,
    keyword TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (system_id, keyword)
)
"#;

pub const CREATE_METHODS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS methods (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
)
"#;

pub const CREATE_BASIS_SETS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS basis_sets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
)
"#;

pub const CREATE_KEYWORDS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS keywords (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL
)
"#;

/// SQL to create the processing_steps table
pub const CREATE_PROCESSING_STEPS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS processing_steps (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON UPDATE CASCADE ON DELETE CASCADE,
    host_id INTEGER REFERENCES hosts(id) ON UPDATE CASCADE ON DELETE CASCADE,
    system_id INTEGER REFERENCES systems(id) ON UPDATE CASCADE ON DELETE CASCADE,
    output_path TEXT
)
"#;

/// SQL to create the step dependency edges.
/// A single row backs both the `preceding` and the `dependent` view.
pub const CREATE_PROCESSING_STEP_HIERARCHY_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS processing_step_hierarchy (
    preceding_id INTEGER NOT NULL REFERENCES processing_steps(id) ON UPDATE CASCADE ON DELETE CASCADE,
    dependent_id INTEGER NOT NULL REFERENCES processing_steps(id) ON UPDATE CASCADE ON DELETE CASCADE,
    PRIMARY KEY (preceding_id, dependent_id),
    CONSTRAINT check_no_self_dependence CHECK (preceding_id != dependent_id)
)
"#;

pub const CREATE_PROCESSING_STEP_PROPERTIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS processing_step_properties (
    step_id INTEGER NOT NULL REFERENCES processing_steps(id) ON UPDATE CASCADE ON DELETE CASCADE,
    keyword TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (step_id, keyword)
)
"#;

pub const CREATE_PROCESSING_STEP_KEYWORDS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS processing_step_keywords (
    step_id INTEGER NOT NULL REFERENCES processing_steps(id) ON UPDATE CASCADE ON DELETE CASCADE,
    keyword_id INTEGER NOT NULL REFERENCES keywords(id) ON UPDATE CASCADE ON DELETE CASCADE,
    PRIMARY KEY (step_id, keyword_id)
)
"#;

/// SQL to create the results table
pub const CREATE_RESULTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    step_id INTEGER NOT NULL REFERENCES processing_steps(id) ON UPDATE CASCADE ON DELETE CASCADE,
    kind TEXT NOT NULL,
    value_text TEXT NOT NULL,
    value_type TEXT NOT NULL CHECK (value_type IN ('int', 'float', 'str'))
)
"#;

pub const CREATE_RESULT_PROPERTIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS result_properties (
    result_id INTEGER NOT NULL REFERENCES results(id) ON UPDATE CASCADE ON DELETE CASCADE,
    keyword TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (result_id, keyword)
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_steps_project ON processing_steps(project_id)",
    "CREATE INDEX IF NOT EXISTS idx_steps_kind ON processing_steps(kind)",
    "CREATE INDEX IF NOT EXISTS idx_hierarchy_dependent ON processing_step_hierarchy(dependent_id)",
    "CREATE INDEX IF NOT EXISTS idx_results_step_kind ON results(step_id, kind)",
    "CREATE INDEX IF NOT EXISTS idx_projects_name ON projects(name)",
    "CREATE INDEX IF NOT EXISTS idx_authors_name ON authors(name)",
];

/// Tables in dependency order, used for statistics
pub const TABLES: &[&str] = &[
    "projects",
    "authors",
    "project_authors",
    "hosts",
    "host_properties",
    "systems",
    "system_properties",
    "methods",
    "basis_sets",
    "keywords",
    "processing_steps",
    "processing_step_hierarchy",
    "processing_step_properties",
    "processing_step_keywords",
    "results",
    "result_properties",
];

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![
        CREATE_PROJECTS_TABLE,
        CREATE_AUTHORS_TABLE,
        CREATE_PROJECT_AUTHORS_TABLE,
        CREATE_HOSTS_TABLE,
        CREATE_HOST_PROPERTIES_TABLE,
        CREATE_SYSTEMS_TABLE,
        CREATE_SYSTEM_PROPERTIES_TABLE,
        CREATE_METHODS_TABLE,
        CREATE_BASIS_SETS_TABLE,
        CREATE_KEYWORDS_TABLE,
        CREATE_PROCESSING_STEPS_TABLE,
        CREATE_PROCESSING_STEP_HIERARCHY_TABLE,
        CREATE_PROCESSING_STEP_PROPERTIES_TABLE,
        CREATE_PROCESSING_STEP_KEYWORDS_TABLE,
        CREATE_RESULTS_TABLE,
        CREATE_RESULT_PROPERTIES_TABLE,
    ];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}
