use calamine::{Data, Reader, Xlsx};
use httpmock::prelude::*;
use ipr_etl::core::Pipeline;
use ipr_etl::domain::model::ProcessingReport;
use ipr_etl::domain::settings::OutputFormat;
use ipr_etl::{CliConfig, EtlEngine, EtlError, IprPipeline, LocalStorage};
use serde_json::json;
use std::path::Path;
use tempfile::TempDir;

const POSTCODES_CSV: &str = "Postcode,City,State\n\
    43000,Kajang,Selangor\n\
    01000,Kangar,Perlis\n\
    50000,Kuala Lumpur,WP Kuala Lumpur\n\
    50000,Bandar Kuala Lumpur,WP Kuala Lumpur\n";

fn upload() -> serde_json::Value {
    json!([
        {
            "form_id": 101,
            "user_id": 9,
            "form_category": "food",
            "createdAt": "2024-08-19T03:21:55.000Z",
            "ic_number": "900101015432",
            "name": "aminah binti abu",
            "race": "Melayu",
            "gender": "P",
            "state": "Selangor",
            "postcode": "43000",
            "address": "no 1, jalan sutera,\nkajang,",
            "mobile_number": "123456789",
            "email": "aminah@example.com",
            "monthly_income": "1500",
            "ic_image": "https://cdn.example.com/ic/101.png",
            "status": "submitted"
        },
        {
            "form_id": 102,
            "form_category": "agriculture",
            "createdAt": "2024-08-20T10:00:00.000Z",
            "ic_number": "12345",
            "name": "ravi a/l kumar",
            "race": "India",
            "gender": "L",
            "state": "Perlis",
            "postcode": 1000,
            "address": "lot 9, kampung baru",
            "mobile_number": "23456789",
            "email": "ravi@example.com",
            "monthly_income": 800
        },
        {
            "form_id": 103,
            "form_category": "maintenance",
            "createdAt": "2024-08-21T08:30:00.000Z",
            "ic_number": "050505105555",
            "name": "tan mei ling",
            "race": "Cina",
            "gender": "P",
            "state": "WP Kuala Lumpur",
            "postcode": "50000",
            "address": "no 1, jalan sutera,\nkajang",
            "mobile_number": "0198765432",
            "email": "tan@example.com",
            "monthly_income": "RM2000"
        }
    ])
}

struct Fixture {
    temp_dir: TempDir,
    output_path: String,
    input: String,
    postcodes: String,
}

fn fixture() -> Fixture {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("upload.json");
    let postcodes = temp_dir.path().join("postcodes.csv");
    std::fs::write(&input, upload().to_string()).unwrap();
    std::fs::write(&postcodes, POSTCODES_CSV).unwrap();

    Fixture {
        output_path: temp_dir.path().join("output").to_str().unwrap().to_string(),
        input: input.to_str().unwrap().to_string(),
        postcodes: postcodes.to_str().unwrap().to_string(),
        temp_dir,
    }
}

fn cli_config(fixture: &Fixture, endpoint: String) -> CliConfig {
    CliConfig {
        input: fixture.input.clone(),
        output_path: fixture.output_path.clone(),
        lookup_files: vec![fixture.postcodes.clone()],
        concurrent_requests: 3,
        formats: vec![OutputFormat::Xlsx, OutputFormat::Csv],
        zip: false,
        geocode_api_key: Some("test-key".to_string()),
        geocode_endpoint: endpoint,
        no_geocode: false,
        reference_year: Some(2024),
        no_report: false,
        verbose: false,
        monitor: false,
    }
}

fn cell(range: &calamine::Range<Data>, row: usize, header: &str) -> String {
    let column = range
        .rows()
        .next()
        .unwrap()
        .iter()
        .position(|c| c.to_string() == header)
        .unwrap_or_else(|| panic!("missing column {}", header));
    range.get((row, column)).unwrap().to_string()
}

#[tokio::test]
async fn test_end_to_end_with_geocoding_and_postcodes() {
    let fixture = fixture();

    let server = MockServer::start_async().await;
    let kajang = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/maps/api/geocode/json")
                .query_param("address", "NO 1, JALAN SUTERA, KAJANG, MALAYSIA")
                .query_param("key", "test-key");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(json!({
                    "status": "OK",
                    "results": [{"geometry": {"location": {"lat": 2.9927, "lng": 101.7909}}}]
                }));
        })
        .await;
    let kampung = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/maps/api/geocode/json")
                .query_param("address", "LOT 9, KAMPUNG BARU, MALAYSIA");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(json!({"status": "ZERO_RESULTS", "results": []}));
        })
        .await;

    let config = cli_config(&fixture, server.url("/maps/api/geocode/json"));
    let storage = LocalStorage::new(fixture.output_path.clone());
    let pipeline = IprPipeline::new(storage, config).unwrap();
    let engine = EtlEngine::new_with_monitoring(pipeline, false);

    let output = engine.run().await.unwrap();
    assert!(output.ends_with("combined_data_with_districts.xlsx"));

    // 同一地址只查詢一次
    kajang.assert_hits_async(1).await;
    kampung.assert_hits_async(1).await;

    let output_dir = Path::new(&fixture.output_path);
    let mut workbook: Xlsx<_> =
        calamine::open_workbook(output_dir.join("combined_data_with_districts.xlsx")).unwrap();
    let range = workbook.worksheet_range("CleanedData").unwrap();

    let headers: Vec<String> = range.rows().next().unwrap().iter().map(|c| c.to_string()).collect();
    assert_eq!(&headers[..5], &["program", "date", "ic", "name", "age"]);
    assert_eq!(headers.last().map(String::as_str), Some("geocode_status"));
    assert!(!headers.iter().any(|h| h == "form_id" || h == "ic_image"));

    // 1 標題列 + 2 筆直接對應 + 50000 對應兩列
    assert_eq!(range.height(), 5);

    assert_eq!(cell(&range, 1, "program"), "INSAN");
    assert_eq!(cell(&range, 1, "date"), "2024-08-19");
    assert_eq!(cell(&range, 1, "ic"), "900101015432");
    assert_eq!(cell(&range, 1, "age"), "34");
    assert_eq!(cell(&range, 1, "name"), "AMINAH BINTI ABU");
    assert_eq!(cell(&range, 1, "district"), "Kajang");
    assert_eq!(cell(&range, 1, "lat"), "2.9927");
    assert_eq!(cell(&range, 1, "phone"), "+60123456789");
    assert_eq!(cell(&range, 1, "salary_monthly"), "1500.00");

    assert_eq!(cell(&range, 2, "age"), "IC ERROR");
    assert_eq!(cell(&range, 2, "postcode"), "01000");
    assert_eq!(cell(&range, 2, "district"), "Kangar");
    assert_eq!(cell(&range, 2, "geocode_status"), "no_result");
    assert_eq!(cell(&range, 2, "lat"), "");

    assert_eq!(cell(&range, 3, "program"), "IKHSAN");
    assert_eq!(cell(&range, 3, "age"), "19");
    assert_eq!(cell(&range, 3, "phone"), "+6010198765432");
    assert_eq!(cell(&range, 3, "salary_monthly"), "RM2000");
    assert_eq!(cell(&range, 3, "district"), "Kuala Lumpur");
    assert_eq!(cell(&range, 4, "district"), "Bandar Kuala Lumpur");
    assert_eq!(cell(&range, 4, "ic"), "050505105555");

    let csv = std::fs::read_to_string(output_dir.join("combined_data_with_districts.csv")).unwrap();
    assert!(csv.starts_with("program,date,ic,name,age,ethnicity,sex,state,district,postcode,lat,lon,address"));
    assert!(csv.contains("\"NO 1, JALAN SUTERA, KAJANG, MALAYSIA\""));

    let report: ProcessingReport =
        serde_json::from_slice(&std::fs::read(output_dir.join("processing_report.json")).unwrap())
            .unwrap();
    assert_eq!(report.input_records, 3);
    assert_eq!(report.output_records, 4);
    assert_eq!(report.ic_errors, 1);
    assert_eq!(report.unmatched_postcodes, 0);
    assert_eq!(report.geocode_summary.get("success"), Some(&2));
    assert_eq!(report.geocode_summary.get("no_result"), Some(&1));
    assert_eq!(report.geocode_failures.len(), 1);
    assert_eq!(report.geocode_failures[0].row, 2);
}

#[tokio::test]
async fn test_zip_bundle_without_geocoding() {
    let fixture = fixture();
    let mut config = cli_config(&fixture, "http://127.0.0.1:1/unused".to_string());
    config.no_geocode = true;
    config.zip = true;
    config.formats = vec![OutputFormat::Json, OutputFormat::Tsv];

    let storage = LocalStorage::new(fixture.output_path.clone());
    let pipeline = IprPipeline::new(storage, config).unwrap();
    let output = EtlEngine::new(pipeline).run().await.unwrap();

    assert!(output.ends_with("ipr_output.zip"));
    let output_dir = Path::new(&fixture.output_path);
    assert!(!output_dir.join("combined_data_with_districts.json").exists());

    let zip_data = std::fs::read(output_dir.join("ipr_output.zip")).unwrap();
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(zip_data)).unwrap();
    assert_eq!(archive.len(), 3);

    let mut content = String::new();
    std::io::Read::read_to_string(
        &mut archive.by_name("combined_data_with_districts.json").unwrap(),
        &mut content,
    )
    .unwrap();
    let rows: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(rows.as_array().unwrap().len(), 4);
    assert_eq!(rows[0]["geocode_status"], json!("skipped"));
    assert_eq!(rows[0]["lat"], serde_json::Value::Null);
    assert_eq!(rows[0]["miskin"], json!(""));
}

#[tokio::test]
async fn test_empty_upload_is_rejected() {
    let fixture = fixture();
    std::fs::write(&fixture.input, "[]").unwrap();

    let mut config = cli_config(&fixture, "http://127.0.0.1:1/unused".to_string());
    config.no_geocode = true;
    let storage = LocalStorage::new(fixture.output_path.clone());
    let pipeline = IprPipeline::new(storage, config).unwrap();

    let result = EtlEngine::new(pipeline).run().await;
    assert!(matches!(result, Err(EtlError::EmptyDataset)));
    assert!(!Path::new(&fixture.output_path).exists());
}

#[tokio::test]
async fn test_malformed_upload_is_input_error() {
    let fixture = fixture();
    std::fs::write(&fixture.input, "{\"name\": \"unterminated").unwrap();

    let mut config = cli_config(&fixture, "http://127.0.0.1:1/unused".to_string());
    config.no_geocode = true;
    let pipeline =
        IprPipeline::new(LocalStorage::new(fixture.output_path.clone()), config).unwrap();

    let err = pipeline.extract().await.unwrap_err();
    assert!(matches!(err, EtlError::InvalidInput { .. }));
    assert!(fixture.temp_dir.path().join("upload.json").exists());
}

#[tokio::test]
async fn test_blank_api_key_skips_geocoding() {
    let fixture = fixture();
    let mut config = cli_config(&fixture, "http://127.0.0.1:1/unused".to_string());
    config.geocode_api_key = Some("   ".to_string());

    // 空白 key 視為未設定：不建立 geocoder，所有列標記為 skipped
    let pipeline =
        IprPipeline::new(LocalStorage::new(fixture.output_path.clone()), config).unwrap();
    let data = pipeline.extract().await.unwrap();
    let result = pipeline.transform(data).await.unwrap();

    assert_eq!(result.report.geocode_summary.get("skipped"), Some(&3));
    assert!(result.report.geocode_failures.is_empty());
    assert_eq!(result.dataset.len(), 4);
}
