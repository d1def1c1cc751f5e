use flight_odbc_client::{args::default_properties, smoke};
use flight_odbc_core::{
    properties::{HOST, PORT, USE_ENCRYPTION},
    FlightSqlConnection, FlightSqlDriver,
};
use flight_odbc_server::FixtureService;

async fn connect() -> FlightSqlConnection {
    let service = FixtureService::new().await.unwrap();
    let addr = flight_odbc_server::spawn(service).await.unwrap();

    let mut properties = default_properties();
    properties.insert(HOST, addr.ip().to_string());
    properties.insert(PORT, addr.port().to_string());
    properties.insert(USE_ENCRYPTION, "false");

    let mut connection = FlightSqlDriver::new().create_connection();
    connection.connect(&properties).await.unwrap();
    connection
}

fn lines(out: Vec<u8>) -> Vec<String> {
    String::from_utf8(out)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn test_bind_column() {
    let connection = connect().await;
    let mut out = vec![];
    smoke::test_bind_column(&connection, &mut out).await.unwrap();

    let lines = lines(out);
    assert_eq!(lines.len(), 12);
    assert_eq!(lines[0], "Fetched 10 rows.");
    assert_eq!(lines[1], "Total:10");
    assert_eq!(lines[2], "Row[0] IncidntNum: '150060275', Category: 'NON-CRIMINAL'");
    assert!(lines[11].starts_with("Row[9] IncidntNum: '"));
}

#[tokio::test]
async fn test_get_data() {
    let connection = connect().await;
    let mut out = vec![];
    smoke::test_get_data(&connection, &mut out).await.unwrap();

    let mut lines = lines(out);
    lines.sort();
    assert_eq!(lines, vec!["1", "2", "3", "4", "5", "6"]);
}

#[tokio::test]
async fn test_bind_column_big_int() {
    let connection = connect().await;
    let mut out = vec![];
    smoke::test_bind_column_big_int(&connection, &mut out)
        .await
        .unwrap();

    let lines = lines(out);
    assert_eq!(lines[0], "Fetched 10 rows.");
    assert_eq!(lines[1], "Total:10");
    assert_eq!(
        lines[2],
        "Row[0] IncidntNum: '150060275', double_field: '1500602.75', Category: 'NON-CRIMINAL'"
    );
}

#[tokio::test]
async fn test_initial_get_tables_call() {
    let connection = connect().await;
    let mut out = vec![];
    smoke::test_initial_get_tables_call(&connection, &mut out)
        .await
        .unwrap();

    let mut lines = lines(out);
    assert_eq!(lines.remove(0), "Initial call simulation - Catalog.Schema.Table");
    lines.sort();
    assert_eq!(
        lines,
        vec![
            "datafusion.@dremio.Test",
            "spark_catalog.IOMETE_USER.ALTAY_TEST",
            "spark_catalog.IOMETE_USER.EVENTS",
            "spark_catalog.IOMETE_USER.RECENT_EVENTS",
        ]
    );
}

#[tokio::test]
async fn test_get_tables_v3() {
    let connection = connect().await;
    let mut out = vec![];
    smoke::test_get_tables_v3(&connection, &mut out).await.unwrap();

    let mut lines = lines(out);
    assert_eq!(lines.remove(0), "Schema call - Catalog.Schema.Table");
    lines.sort();
    assert_eq!(
        lines,
        vec![
            "spark_catalog.IOMETE_USER.ALTAY_TEST",
            "spark_catalog.IOMETE_USER.EVENTS",
            "spark_catalog.IOMETE_USER.RECENT_EVENTS",
        ]
    );
}

#[tokio::test]
async fn test_get_columns_v3() {
    let connection = connect().await;
    let mut out = vec![];
    smoke::test_get_columns_v3(&connection, &mut out).await.unwrap();

    let lines = lines(out);
    assert_eq!(lines.len(), 6);
    assert_eq!(lines[5], "18");

    let first: Vec<&str> = lines[0].split('\t').collect();
    // 18 values, each followed by a tab
    assert_eq!(first.len(), 19);
    assert_eq!(&first[..4], ["spark_catalog", "IOMETE_USER", "ALTAY_TEST", "id"]);
    assert_eq!(first[5], "BIGINT");
    assert_eq!(first[11], "NULL");
    assert_eq!(first[16], "1");
    assert_eq!(first[17], "NO");
}

#[tokio::test]
async fn test_run() {
    let connection = connect().await;
    let mut out = vec![];
    smoke::run(&connection, &mut out).await.unwrap();

    let lines = lines(out);
    assert_eq!(lines[0], "Initial call simulation - Catalog.Schema.Table");
    assert!(lines.contains(&"Schema call - Catalog.Schema.Table".to_string()));
    assert_eq!(lines.last().map(String::as_str), Some("18"));
}
