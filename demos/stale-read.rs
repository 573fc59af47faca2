//! Explore a two-session model and replay every path against a connection.

use forkcase::*;

#[derive(Signature, Default)]
struct Sessions {
    writer_in_txn: bool,
    reader_in_txn: bool,
    written: bool,
    #[signature(skip)]
    conn: Option<RecordingConnection>,
}

impl Sessions {
    fn online(conn: RecordingConnection) -> Self {
        Sessions {
            conn: Some(conn),
            ..Sessions::default()
        }
    }

    fn run(&mut self, sql: &str) -> Result<()> {
        match self.conn.as_mut() {
            Some(conn) => conn.exec_sql(sql),
            None => Ok(()),
        }
    }
}

impl State for Sessions {
    fn close(&mut self) -> Result<()> {
        match self.conn.as_mut() {
            Some(conn) => conn.close(),
            None => Ok(()),
        }
    }
}

fn main() {
    let writer_idle = Condition::new("writer_idle", |s: &Sessions| !s.writer_in_txn);
    let writer_busy = Condition::new("writer_busy", |s: &Sessions| s.writer_in_txn);
    let reader_idle = Condition::new("reader_idle", |s: &Sessions| !s.reader_in_txn);
    let reader_busy = Condition::new("reader_busy", |s: &Sessions| s.reader_in_txn);

    let actions = ActionSet::new()
        .action("writer_begin", writer_idle, |s: &mut Sessions, _: &Step| {
            s.writer_in_txn = true;
            s.run("begin")
        })
        .action("writer_update", writer_busy.clone(), |s: &mut Sessions, _: &Step| {
            s.written = true;
            s.run("update t set v = 2 where id = 1")
        })
        .action("writer_commit", writer_busy, |s: &mut Sessions, _: &Step| {
            s.writer_in_txn = false;
            s.run("commit")
        })
        .action("reader_begin", reader_idle, |s: &mut Sessions, _: &Step| {
            s.reader_in_txn = true;
            s.run("begin")
        })
        .generate(
            reader_busy,
            [("read_now", "now()"), ("read_stale", "now() - interval 1 second")],
            |s: &mut Sessions, step: &Step, at: &&str| {
                let sql = format!("select v from t as of timestamp {} where id = 1", at);
                println!("  step {}: {}", step.current_action_index(), sql);
                s.run(&sql)
            },
        );

    let driver = match StateDriver::new(actions) {
        Ok(driver) => driver.with_config(ExploreConfig::default().with_max_depth(6)),
        Err(error) => {
            println!("invalid model: {}", error);
            return;
        }
    };

    let db = RecordingConnection::new();
    let online = db.clone();
    let report = driver.verify(
        "stale_read",
        Sessions::default,
        move |_| Sessions::online(online.clone()),
        &RunConfig::from_env().unwrap_or_default(),
    );
    match report {
        Ok(report) => println!("{}", report),
        Err(error) => println!("exploration failed: {}", error),
    }
    println!("{} statements sent", db.statements().len());
}
