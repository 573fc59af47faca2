//! The database collaborator boundary.
//!
//! A test body reaches the database only through side effects: the kit
//! helpers here wrap every connect, statement and query in `execute`, so the
//! build phase never touches a connection. Each call is logged on the case's
//! execute path under `sql@conn#N`.

use crate::error::{ForkcaseError, Result};
use crate::kit::{Env, TestKit, Var};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// A single column value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => f.write_str("NULL"),
            SqlValue::Int(v) => write!(f, "{}", v),
            SqlValue::Float(v) => write!(f, "{}", v),
            SqlValue::Text(v) => write!(f, "'{}'", v),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Float(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(SqlValue::Null, Into::into)
    }
}

pub type Row = Vec<SqlValue>;
pub type Rows = Vec<Row>;

/// Where to connect. Only used for opening connections and for the path log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        ConnectOptions {
            host: "localhost".to_string(),
            port: 4000,
            database: "test".to_string(),
            user: None,
            password: None,
        }
    }
}

impl ConnectOptions {
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_user(mut self, user: impl Into<String>, password: Option<String>) -> Self {
        self.user = Some(user.into());
        self.password = password;
        self
    }
}

impl fmt::Display for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "host: {}, port: {}, database: {}, user: {}, password: {}",
            self.host,
            self.port,
            self.database,
            self.user.as_deref().unwrap_or("N/A"),
            if self.password.is_some() { "*yes*" } else { "N/A" }
        )
    }
}

/// A live connection to the engine under test.
pub trait Connection {
    fn exec_sql(&mut self, sql: &str) -> Result<()>;

    fn query(&mut self, sql: &str) -> Result<Rows>;

    fn prepare(&mut self, sql: &str) -> Result<Box<dyn PreparedStatement>>;

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

pub trait PreparedStatement {
    fn query(&mut self, params: &[SqlValue]) -> Result<Rows>;

    fn close(&mut self) -> Result<()>;
}

fn with_params(sql: &str, params: &[SqlValue]) -> String {
    if params.is_empty() {
        return sql.to_string();
    }
    let params: Vec<String> = params.iter().map(ToString::to_string).collect();
    format!("{}, ({})", sql, params.join(", "))
}

/// A connection opened by [`SqlKit::connect`], numbered per case.
#[derive(Clone)]
pub struct Session {
    id: u64,
    conn: Rc<RefCell<Box<dyn Connection>>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Session(conn#{})", self.id)
    }
}

impl Session {
    /// Open a connection inside a running case. The connection is closed
    /// when the case ends.
    pub fn open<F>(env: &mut Env<'_>, options: &ConnectOptions, open: F) -> Result<Session>
    where
        F: FnOnce(&ConnectOptions) -> Result<Box<dyn Connection>>,
    {
        let id = env.allocate_id("conn")?;
        env.log_path(format!("new_conn#{}", id), options.to_string());
        let conn = Rc::new(RefCell::new(open(options)?));
        let closing = conn.clone();
        env.defer(move || closing.borrow_mut().close())?;
        tracing::debug!(conn = id, "connection opened");
        Ok(Session { id, conn })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    fn topic(&self) -> String {
        format!("sql@conn#{}", self.id)
    }

    pub fn exec_sql(&self, env: &mut Env<'_>, sql: &str) -> Result<()> {
        env.log_path(self.topic(), sql);
        self.conn.borrow_mut().exec_sql(sql)
    }

    pub fn query(&self, env: &mut Env<'_>, sql: &str) -> Result<Rows> {
        env.log_path(self.topic(), sql);
        self.conn.borrow_mut().query(sql)
    }

    /// Prepare `sql`. The statement is closed when the case ends.
    pub fn prepare(&self, env: &mut Env<'_>, sql: &str) -> Result<Statement> {
        env.log_path(self.topic(), format!("prepare {}", sql));
        let stmt = Rc::new(RefCell::new(self.conn.borrow_mut().prepare(sql)?));
        let closing = stmt.clone();
        env.defer(move || closing.borrow_mut().close())?;
        Ok(Statement {
            session: self.id,
            sql: sql.to_string(),
            stmt,
        })
    }
}

/// A statement prepared on a [`Session`].
#[derive(Clone)]
pub struct Statement {
    session: u64,
    sql: String,
    stmt: Rc<RefCell<Box<dyn PreparedStatement>>>,
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Statement(conn#{}: {})", self.session, self.sql)
    }
}

impl Statement {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn query(&self, env: &mut Env<'_>, params: &[SqlValue]) -> Result<Rows> {
        env.log_path(
            format!("sql@conn#{}", self.session),
            with_params(&self.sql, params),
        );
        self.stmt.borrow_mut().query(params)
    }
}

/// Database helpers on the test kit. Every helper is a recorded side effect.
pub trait SqlKit {
    fn connect<F>(&mut self, options: ConnectOptions, open: F) -> Result<Var<Session>>
    where
        F: Fn(&ConnectOptions) -> Result<Box<dyn Connection>> + 'static;

    fn exec_sql(&mut self, session: &Var<Session>, sql: impl Into<Var<String>>) -> Result<()>;

    fn query(&mut self, session: &Var<Session>, sql: impl Into<Var<String>>) -> Result<Var<Rows>>;

    fn prepare(
        &mut self,
        session: &Var<Session>,
        sql: impl Into<Var<String>>,
    ) -> Result<Var<Statement>>;

    fn query_prepared(
        &mut self,
        stmt: &Var<Statement>,
        params: Vec<Var<SqlValue>>,
    ) -> Result<Var<Rows>>;
}

impl SqlKit for TestKit {
    fn connect<F>(&mut self, options: ConnectOptions, open: F) -> Result<Var<Session>>
    where
        F: Fn(&ConnectOptions) -> Result<Box<dyn Connection>> + 'static,
    {
        self.execute(move |env| Session::open(env, &options, &open))
    }

    fn exec_sql(&mut self, session: &Var<Session>, sql: impl Into<Var<String>>) -> Result<()> {
        let (session, sql) = (session.clone(), sql.into());
        self.execute(move |env| {
            let (session, sql) = (env.get(&session)?, env.get(&sql)?);
            session.exec_sql(env, &sql)
        })?;
        Ok(())
    }

    fn query(&mut self, session: &Var<Session>, sql: impl Into<Var<String>>) -> Result<Var<Rows>> {
        let (session, sql) = (session.clone(), sql.into());
        self.execute(move |env| {
            let (session, sql) = (env.get(&session)?, env.get(&sql)?);
            session.query(env, &sql)
        })
    }

    fn prepare(
        &mut self,
        session: &Var<Session>,
        sql: impl Into<Var<String>>,
    ) -> Result<Var<Statement>> {
        let (session, sql) = (session.clone(), sql.into());
        self.execute(move |env| {
            let (session, sql) = (env.get(&session)?, env.get(&sql)?);
            session.prepare(env, &sql)
        })
    }

    fn query_prepared(
        &mut self,
        stmt: &Var<Statement>,
        params: Vec<Var<SqlValue>>,
    ) -> Result<Var<Rows>> {
        let stmt = stmt.clone();
        self.execute(move |env| {
            let stmt = env.get(&stmt)?;
            let params = params
                .iter()
                .map(|param| env.get(param))
                .collect::<Result<Vec<_>>>()?;
            stmt.query(env, &params)
        })
    }
}

#[derive(Default)]
struct Recording {
    statements: Vec<String>,
    rows: HashMap<String, Rows>,
    errors: HashMap<String, (u16, String)>,
}

impl Recording {
    fn run(&mut self, entry: String, sql: &str) -> Result<Rows> {
        self.statements.push(entry);
        if let Some((code, message)) = self.errors.get(sql) {
            return Err(ForkcaseError::Database {
                code: *code,
                message: message.clone(),
            });
        }
        Ok(self.rows.get(sql).cloned().unwrap_or_default())
    }
}

/// An in-memory [`Connection`] that records every call and answers from a
/// script. Clones share the same recording.
#[derive(Clone, Default)]
pub struct RecordingConnection {
    inner: Rc<RefCell<Recording>>,
}

impl RecordingConnection {
    pub fn new() -> Self {
        RecordingConnection::default()
    }

    /// Answer `sql` with `rows`.
    pub fn with_rows(self, sql: impl Into<String>, rows: Rows) -> Self {
        self.inner.borrow_mut().rows.insert(sql.into(), rows);
        self
    }

    /// Fail `sql` with a database error.
    pub fn with_error(self, sql: impl Into<String>, code: u16, message: impl Into<String>) -> Self {
        self.inner
            .borrow_mut()
            .errors
            .insert(sql.into(), (code, message.into()));
        self
    }

    /// Everything run so far, in order.
    pub fn statements(&self) -> Vec<String> {
        self.inner.borrow().statements.clone()
    }

    /// A boxed handle sharing this recording.
    pub fn boxed(&self) -> Box<dyn Connection> {
        Box::new(self.clone())
    }
}

impl Connection for RecordingConnection {
    fn exec_sql(&mut self, sql: &str) -> Result<()> {
        self.inner.borrow_mut().run(sql.to_string(), sql)?;
        Ok(())
    }

    fn query(&mut self, sql: &str) -> Result<Rows> {
        self.inner.borrow_mut().run(sql.to_string(), sql)
    }

    fn prepare(&mut self, sql: &str) -> Result<Box<dyn PreparedStatement>> {
        self.inner
            .borrow_mut()
            .statements
            .push(format!("prepare {}", sql));
        Ok(Box::new(RecordingStatement {
            inner: self.inner.clone(),
            sql: sql.to_string(),
        }))
    }

    fn close(&mut self) -> Result<()> {
        self.inner.borrow_mut().statements.push("close".to_string());
        Ok(())
    }
}

struct RecordingStatement {
    inner: Rc<RefCell<Recording>>,
    sql: String,
}

impl PreparedStatement for RecordingStatement {
    fn query(&mut self, params: &[SqlValue]) -> Result<Rows> {
        let entry = with_params(&self.sql, params);
        self.inner.borrow_mut().run(entry, &self.sql)
    }

    fn close(&mut self) -> Result<()> {
        self.inner
            .borrow_mut()
            .statements
            .push(format!("close {}", self.sql));
        Ok(())
    }
}
