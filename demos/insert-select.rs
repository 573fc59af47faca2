//! Insert then select a row for every table and key combination.

use forkcase::*;

fn main() {
    let db = RecordingConnection::new()
        .with_rows("select id from tb where id = 5", vec![vec![SqlValue::Int(5)]]);
    let handle = db.clone();

    let test = ForkTest::new("insert_select", move |kit: &mut TestKit| {
        let table = kit.pick_enum(["ta".to_string(), "tb".to_string()])?;
        let pk = kit.pick_enum([1i64, 3, 5])?;
        let name = kit.format("{}_pk{}", vec![table.clone(), pk.display()])?;
        kit.set_name(name);

        let handle = handle.clone();
        let conn = kit.connect(ConnectOptions::default(), move |_| Ok(handle.boxed()))?;
        let create = kit.format("create table {}", vec![table.clone()])?;
        kit.exec_sql(&conn, create)?;
        let insert = kit.format("insert into {} values ({})", vec![table.clone(), pk.display()])?;
        kit.exec_sql(&conn, insert)?;
        let select = kit.format("select id from {} where id = {}", vec![table, pk.display()])?;
        let rows = kit.query(&conn, select)?;
        // the recording connection only knows one row, so five cases fail
        let expected = pk.map(|pk| vec![vec![SqlValue::Int(pk)]]);
        kit.assert_eq(rows, expected)
    });

    match test.run() {
        Ok(report) => println!("{}", report),
        Err(error) => println!("could not build the test: {}", error),
    }
    println!();
    println!("Statements sent:");
    for statement in db.statements() {
        println!("  {}", statement);
    }
}
