//! In-memory fakes and a router harness for handler tests.

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, header};
use axum::response::Response;
use chrono::Duration;
use rootcause::Report;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use tacokumo_admin_core::{ProjectId, RoleId, UserGroupId, UserId};
use tacokumo_admin_platform_access::store::{DEFAULT_SESSION_TTL, DEFAULT_STATE_TTL};
use tacokumo_admin_platform_access::{
    CsrfState, FlowSettings, MemoryStore, OAuthFlow, ProviderUser, RecordStore, Session, SessionId,
    SessionStore, StoreError, TeamMembership, UpstreamTokens,
};
use tower::ServiceExt;
use url::Url;
use wiremock::MockServer;

use crate::auth::github::GitHubClient;
use crate::auth::github::tests::config_for;
use crate::auth::jwks::JwksCache;
use crate::auth::jwks::tests::{JWKS_PATH, TEST_KID, serve_jwks};
use crate::auth::jwt::JwtValidator;
use crate::auth::jwt::tests::{TEST_CLIENT_ID, claims_for, sign};
use crate::auth::{AppState, Authenticator};
use crate::config::SessionConfig;
use crate::db::{
    HealthProbe, Page, ProjectKind, ProjectRecord, ProjectStore, RoleRecord, RoleStore, Stores,
    UserGroupRecord, UserGroupStore, UserRecord, UserStore,
};

pub(crate) const FRONTEND_URL: &str = "https://console.tacokumo.example/";

#[derive(Debug)]
struct UniqueViolation(&'static str);

impl fmt::Display for UniqueViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "duplicate key value violates unique constraint \"{}\"", self.0)
    }
}

impl std::error::Error for UniqueViolation {}

impl sqlx::error::DatabaseError for UniqueViolation {
    fn message(&self) -> &str {
        "duplicate key value violates unique constraint"
    }

    fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self
    }

    fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
        self
    }

    fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
        self
    }

    fn kind(&self) -> sqlx::error::ErrorKind {
        sqlx::error::ErrorKind::UniqueViolation
    }
}

fn unique_violation(constraint: &'static str) -> sqlx::Error {
    sqlx::Error::Database(Box::new(UniqueViolation(constraint)))
}

fn paged<T>(items: impl Iterator<Item = T>, page: Page) -> Vec<T> {
    items
        .skip(page.offset as usize)
        .take(page.limit as usize)
        .collect()
}

/// All resource stores over plain vectors, with the schema's uniqueness
/// rules.
pub(crate) struct MemoryDb {
    projects: Mutex<Vec<ProjectRecord>>,
    roles: Mutex<Vec<RoleRecord>>,
    user_groups: Mutex<Vec<UserGroupRecord>>,
    users: Mutex<Vec<UserRecord>>,
    members: Mutex<Vec<(UserGroupId, UserId)>>,
    user_roles: Mutex<Vec<(UserId, RoleId)>>,
    pub healthy: AtomicBool,
}

impl MemoryDb {
    fn new() -> Self {
        Self {
            projects: Mutex::default(),
            roles: Mutex::default(),
            user_groups: Mutex::default(),
            users: Mutex::default(),
            members: Mutex::default(),
            user_roles: Mutex::default(),
            healthy: AtomicBool::new(true),
        }
    }

    pub(crate) fn add_member(&self, group: UserGroupId, user: UserId) {
        self.members.lock().unwrap().push((group, user));
    }

    pub(crate) fn assign_role(&self, user: UserId, role: RoleId) {
        self.user_roles.lock().unwrap().push((user, role));
    }
}

#[async_trait]
impl ProjectStore for MemoryDb {
    async fn create(&self, project: &ProjectRecord) -> Result<(), sqlx::Error> {
        let mut projects = self.projects.lock().unwrap();
        if projects.iter().any(|p| p.name == project.name) {
            return Err(unique_violation("projects_name_key"));
        }
        projects.push(project.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: ProjectId) -> Result<Option<ProjectRecord>, sqlx::Error> {
        Ok(self
            .projects
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }

    async fn update(&self, project: &ProjectRecord) -> Result<(), sqlx::Error> {
        let mut projects = self.projects.lock().unwrap();
        if projects
            .iter()
            .any(|p| p.id != project.id && p.name == project.name)
        {
            return Err(unique_violation("projects_name_key"));
        }
        if let Some(existing) = projects.iter_mut().find(|p| p.id == project.id) {
            *existing = project.clone();
        }
        Ok(())
    }

    async fn list_visible(
        &self,
        owner: Option<&str>,
        shared_names: &[String],
        page: Page,
    ) -> Result<Vec<ProjectRecord>, sqlx::Error> {
        let mut visible: Vec<ProjectRecord> = self
            .projects
            .lock()
            .unwrap()
            .iter()
            .filter(|p| match p.kind {
                ProjectKind::Personal => owner.is_some() && p.owner.as_deref() == owner,
                ProjectKind::Shared => shared_names.contains(&p.name),
            })
            .cloned()
            .collect();
        visible.sort_by_key(|p| p.created_at);
        Ok(paged(visible.into_iter(), page))
    }
}

#[async_trait]
impl RoleStore for MemoryDb {
    async fn create(&self, role: &RoleRecord) -> Result<(), sqlx::Error> {
        let mut roles = self.roles.lock().unwrap();
        if roles
            .iter()
            .any(|r| r.project_id == role.project_id && r.name == role.name)
        {
            return Err(unique_violation("roles_project_id_name_key"));
        }
        roles.push(role.clone());
        Ok(())
    }

    async fn find(
        &self,
        project_id: ProjectId,
        role_id: RoleId,
    ) -> Result<Option<RoleRecord>, sqlx::Error> {
        Ok(self
            .roles
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.project_id == project_id && r.id == role_id)
            .cloned())
    }

    async fn update(&self, role: &RoleRecord) -> Result<(), sqlx::Error> {
        if let Some(existing) = self
            .roles
            .lock()
            .unwrap()
            .iter_mut()
            .find(|r| r.id == role.id)
        {
            *existing = role.clone();
        }
        Ok(())
    }

    async fn list_by_project(
        &self,
        project_id: ProjectId,
        page: Page,
    ) -> Result<Vec<RoleRecord>, sqlx::Error> {
        let mut roles: Vec<RoleRecord> = self
            .roles
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.project_id == project_id)
            .cloned()
            .collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(paged(roles.into_iter(), page))
    }
}

#[async_trait]
impl UserGroupStore for MemoryDb {
    async fn create(&self, group: &UserGroupRecord) -> Result<(), sqlx::Error> {
        let mut groups = self.user_groups.lock().unwrap();
        if groups
            .iter()
            .any(|g| g.project_id == group.project_id && g.name == group.name)
        {
            return Err(unique_violation("user_groups_project_id_name_key"));
        }
        groups.push(group.clone());
        Ok(())
    }

    async fn find(
        &self,
        project_id: ProjectId,
        group_id: UserGroupId,
    ) -> Result<Option<UserGroupRecord>, sqlx::Error> {
        Ok(self
            .user_groups
            .lock()
            .unwrap()
            .iter()
            .find(|g| g.project_id == project_id && g.id == group_id)
            .cloned())
    }

    async fn update(&self, group: &UserGroupRecord) -> Result<(), sqlx::Error> {
        if let Some(existing) = self
            .user_groups
            .lock()
            .unwrap()
            .iter_mut()
            .find(|g| g.id == group.id)
        {
            *existing = group.clone();
        }
        Ok(())
    }

    async fn list_by_project(
        &self,
        project_id: ProjectId,
        page: Page,
    ) -> Result<Vec<UserGroupRecord>, sqlx::Error> {
        let mut groups: Vec<UserGroupRecord> = self
            .user_groups
            .lock()
            .unwrap()
            .iter()
            .filter(|g| g.project_id == project_id)
            .cloned()
            .collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(paged(groups.into_iter(), page))
    }

    async fn list_members(&self, group_id: UserGroupId) -> Result<Vec<UserRecord>, sqlx::Error> {
        let member_ids: Vec<UserId> = self
            .members
            .lock()
            .unwrap()
            .iter()
            .filter(|(g, _)| *g == group_id)
            .map(|(_, u)| *u)
            .collect();
        let mut members: Vec<UserRecord> = self
            .users
            .lock()
            .unwrap()
            .iter()
            .filter(|u| member_ids.contains(&u.id))
            .cloned()
            .collect();
        members.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(members)
    }
}

#[async_trait]
impl UserStore for MemoryDb {
    async fn create(&self, user: &UserRecord) -> Result<(), sqlx::Error> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.email == user.email) {
            return Err(unique_violation("users_email_key"));
        }
        users.push(user.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<UserRecord>, sqlx::Error> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.id == id)
            .cloned())
    }

    async fn list_by_emails(
        &self,
        emails: &[String],
        page: Page,
    ) -> Result<Vec<UserRecord>, sqlx::Error> {
        let mut users: Vec<UserRecord> = self
            .users
            .lock()
            .unwrap()
            .iter()
            .filter(|u| emails.contains(&u.email))
            .cloned()
            .collect();
        users.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(paged(users.into_iter(), page))
    }

    async fn list_roles(&self, id: UserId) -> Result<Vec<RoleRecord>, sqlx::Error> {
        let role_ids: Vec<RoleId> = self
            .user_roles
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| *u == id)
            .map(|(_, r)| *r)
            .collect();
        let mut roles: Vec<RoleRecord> = self
            .roles
            .lock()
            .unwrap()
            .iter()
            .filter(|r| role_ids.contains(&r.id))
            .cloned()
            .collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }
}

#[async_trait]
impl HealthProbe for MemoryDb {
    async fn ping(&self) -> Result<(), sqlx::Error> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(sqlx::Error::PoolTimedOut)
        }
    }
}

/// A session store whose backend is always down.
struct FailingSessions;

#[async_trait]
impl RecordStore<Session> for FailingSessions {
    async fn create(&self, _record: &Session) -> Result<(), Report<StoreError>> {
        Err(backend_down().into())
    }

    async fn get(&self, _id: &str) -> Result<Option<Session>, Report<StoreError>> {
        Err(backend_down().into())
    }

    async fn delete(&self, _id: &str) -> Result<(), Report<StoreError>> {
        Err(backend_down().into())
    }
}

fn backend_down() -> StoreError {
    StoreError::Backend {
        details: "connection refused".to_string(),
    }
}

/// The full router with in-memory storage, a mocked GitHub and a mocked
/// JWKS endpoint that also acts as the token issuer.
pub(crate) struct TestApp {
    pub github: MockServer,
    pub jwks: MockServer,
    pub sessions: Arc<MemoryStore<Session>>,
    pub states: Arc<MemoryStore<CsrfState>>,
    pub db: Arc<MemoryDb>,
    router: Router,
}

impl TestApp {
    pub(crate) async fn new() -> Self {
        Self::build(false).await
    }

    /// Like [`TestApp::new`], but every session store call fails.
    pub(crate) async fn with_failing_sessions() -> Self {
        Self::build(true).await
    }

    async fn build(failing_sessions: bool) -> Self {
        let github = MockServer::start().await;
        let jwks = MockServer::start().await;
        serve_jwks(&jwks, &[TEST_KID]).await;

        let keys = Arc::new(JwksCache::new(format!("{}{JWKS_PATH}", jwks.uri())).unwrap());
        keys.refresh().await.unwrap();
        let validator = Arc::new(JwtValidator::new(
            keys,
            jwks.uri(),
            vec![TEST_CLIENT_ID.to_string()],
        ));

        let memory_sessions = Arc::new(MemoryStore::<Session>::new(DEFAULT_SESSION_TTL));
        let states = Arc::new(MemoryStore::<CsrfState>::new(DEFAULT_STATE_TTL));
        let sessions: Arc<SessionStore> = if failing_sessions {
            Arc::new(FailingSessions) as Arc<SessionStore>
        } else {
            memory_sessions.clone() as Arc<SessionStore>
        };

        let session_config = SessionConfig::default();
        let settings = FlowSettings {
            frontend_url: Url::parse(FRONTEND_URL).unwrap(),
            session_ttl: session_config.ttl(),
            state_ttl: session_config.state_ttl(),
            allowed_orgs: vec!["tacokumo".to_string()],
        };
        let provider = Arc::new(GitHubClient::new(&config_for(&github)).unwrap());
        let flow = OAuthFlow::new(provider, sessions.clone(), states.clone(), settings);

        let db = Arc::new(MemoryDb::new());
        let stores = Stores {
            projects: db.clone(),
            roles: db.clone(),
            user_groups: db.clone(),
            users: db.clone(),
            health: db.clone(),
        };

        let state = Arc::new(AppState {
            authenticator: Authenticator::new(sessions.clone(), Some(validator)),
            flow,
            sessions,
            stores,
            session_config,
        });

        Self {
            github,
            jwks,
            sessions: memory_sessions,
            states,
            db,
            router: crate::app(state),
        }
    }

    pub(crate) fn issuer(&self) -> String {
        self.jwks.uri()
    }

    /// A signed access token for `auth0|alice` carrying `permissions`.
    pub(crate) fn token(&self, permissions: &[&str]) -> String {
        sign(&claims_for(&self.issuer(), permissions), TEST_KID)
    }

    pub(crate) async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Stores a session for octocat expiring after `ttl`.
    pub(crate) async fn insert_session(&self, ttl: Duration) -> Session {
        let user = ProviderUser {
            id: 583231,
            login: "octocat".to_string(),
            name: "The Octocat".to_string(),
            email: "octocat@github.com".to_string(),
            avatar_url: String::new(),
        };
        let tokens = UpstreamTokens {
            access_token: "gho_test_token".to_string(),
            refresh_token: None,
        };
        let teams = vec![TeamMembership {
            org_name: "tacokumo".to_string(),
            team_name: "platform".to_string(),
            role: "member".to_string(),
        }];
        let session = Session::for_user(SessionId::generate().unwrap(), &user, &tokens, teams, ttl);
        self.sessions.create(&session).await.unwrap();
        session
    }

    pub(crate) async fn seed_personal_project(&self, name: &str, owner: &str) -> ProjectRecord {
        let project =
            ProjectRecord::personal(name.to_string(), String::new(), owner.to_string());
        ProjectStore::create(self.db.as_ref(), &project).await.unwrap();
        project
    }

    pub(crate) async fn seed_shared_project(&self, name: &str) -> ProjectRecord {
        let project = ProjectRecord::shared(name.to_string(), String::new());
        ProjectStore::create(self.db.as_ref(), &project).await.unwrap();
        project
    }

    pub(crate) async fn seed_role(&self, project: &ProjectRecord, name: &str) -> RoleRecord {
        let role = RoleRecord::new(project.id, name.to_string(), String::new());
        RoleStore::create(self.db.as_ref(), &role).await.unwrap();
        role
    }

    pub(crate) async fn seed_user_group(
        &self,
        project: &ProjectRecord,
        name: &str,
    ) -> UserGroupRecord {
        let group = UserGroupRecord::new(project.id, name.to_string(), String::new());
        UserGroupStore::create(self.db.as_ref(), &group).await.unwrap();
        group
    }

    pub(crate) async fn seed_user(&self, email: &str) -> UserRecord {
        let user = UserRecord::new(email.to_string());
        UserStore::create(self.db.as_ref(), &user).await.unwrap();
        user
    }
}

/// Builds a JSON request authenticated with `token`.
pub(crate) fn json_request(
    method: &str,
    path: &str,
    token: &str,
    body: serde_json::Value,
) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(path)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub(crate) async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
