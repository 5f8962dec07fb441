/// A schema change applied once and recorded in `_migrations`.
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: "
        CREATE TABLE users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE subscriptions (
            user_id TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
            plan TEXT NOT NULL DEFAULT 'free'
                CHECK (plan IN ('free', 'premium', 'ultimate')),
            stripe_customer_id TEXT,
            stripe_subscription_id TEXT,
            updated_at TEXT NOT NULL
        );

        CREATE UNIQUE INDEX idx_subscriptions_customer
            ON subscriptions(stripe_customer_id)
            WHERE stripe_customer_id IS NOT NULL;

        CREATE TABLE workspaces (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            description TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX idx_workspaces_owner ON workspaces(owner_id);

        CREATE TABLE companions (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            workspace_id TEXT REFERENCES workspaces(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            personality TEXT NOT NULL DEFAULT '{}',
            appearance TEXT NOT NULL DEFAULT '{}',
            config TEXT NOT NULL DEFAULT '{}',
            voice TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX idx_companions_owner ON companions(owner_id);
        CREATE INDEX idx_companions_workspace ON companions(workspace_id);

        CREATE TABLE conversations (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            companion_id TEXT NOT NULL REFERENCES companions(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (user_id, companion_id)
        );

        CREATE TABLE messages (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            sender TEXT NOT NULL CHECK (sender IN ('user', 'companion')),
            content TEXT NOT NULL,
            emotions TEXT NOT NULL DEFAULT '[]',
            timestamp TEXT NOT NULL
        );

        CREATE INDEX idx_messages_conversation ON messages(conversation_id, seq);

        CREATE TABLE memories (
            id TEXT PRIMARY KEY,
            companion_id TEXT NOT NULL REFERENCES companions(id) ON DELETE CASCADE,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            kind TEXT NOT NULL,
            content TEXT NOT NULL,
            importance INTEGER NOT NULL CHECK (importance BETWEEN 1 AND 10),
            conversation_id TEXT REFERENCES conversations(id) ON DELETE SET NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX idx_memories_companion ON memories(companion_id, importance);

        CREATE TABLE teams (
            id TEXT PRIMARY KEY,
            creator_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            description TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE team_members (
            team_id TEXT NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            role TEXT NOT NULL CHECK (role IN ('admin', 'editor', 'viewer')),
            joined_at TEXT NOT NULL,
            PRIMARY KEY (team_id, user_id)
        );

        CREATE INDEX idx_team_members_user ON team_members(user_id);

        CREATE TABLE tools (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            description TEXT NOT NULL,
            parameters TEXT NOT NULL DEFAULT '{}',
            handler_url TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (owner_id, name)
        );

        CREATE TABLE voice_usage (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            companion_id TEXT REFERENCES companions(id) ON DELETE SET NULL,
            seconds INTEGER NOT NULL CHECK (seconds > 0),
            characters INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX idx_voice_usage_user ON voice_usage(user_id, created_at);
        ",
    },
];
