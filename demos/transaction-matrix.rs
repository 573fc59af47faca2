//! Every isolation level, lock mode and transaction ending.

use forkcase::*;

fn main() {
    let db = RecordingConnection::new();
    let handle = db.clone();

    let test = ForkTest::new("transaction_matrix", move |kit: &mut TestKit| {
        let isolation = kit.pick_enum(["READ-COMMITTED", "REPEATABLE-READ"].map(String::from))?;
        let pessimistic = kit.pick_bool()?;
        let commit = kit.pick_bool()?;

        let handle = handle.clone();
        let conn = kit.connect(ConnectOptions::default(), move |_| Ok(handle.boxed()))?;
        let set = kit.format("set transaction_isolation = '{}'", vec![isolation])?;
        kit.exec_sql(&conn, set)?;
        let begin = kit
            .if_::<String>(pessimistic)
            .then_return("begin pessimistic".to_string())
            .else_return("begin optimistic".to_string())?;
        kit.exec_sql(&conn, begin)?;
        kit.exec_sql(&conn, "update t set v = v + 1 where id = 1")?;

        let session = conn.clone();
        kit.if_::<()>(commit)
            .then_execute(move |env| {
                let session = env.get(&session)?;
                session.exec_sql(env, "commit")
            })
            .else_execute(move |env| {
                let session = env.get(&conn)?;
                session.exec_sql(env, "rollback")
            })?;
        Ok(())
    })
    .with_config(RunConfig::from_env().unwrap_or_default());

    match test.run() {
        Ok(report) => println!("{}", report),
        Err(error) => println!("could not build the test: {}", error),
    }
    println!("{} statements sent", db.statements().len());
}
