use ipr_etl::config::toml_config::TomlConfig;
use ipr_etl::core::xlsx::write_workbook;
use ipr_etl::core::ConfigProvider;
use ipr_etl::utils::validation::Validate;
use ipr_etl::{EtlEngine, IprPipeline, LocalStorage};
use serde_json::{json, Value};
use std::io::Read;
use tempfile::TempDir;

fn write_inputs(dir: &TempDir) -> (String, String) {
    let input = dir.path().join("week34.json");
    std::fs::write(
        &input,
        json!([
            {"form_category": "food", "ic_number": "880808088888", "name": "siti", "postcode": "43000", "address": "taman mewah"},
            {"form_category": "fishery", "ic_number": "x", "name": "ali", "postcode": "99999", "address": "jalan laut"},
            {"form_category": "agriculture", "ic_number": "010203040506", "name": "mei", "postcode": 1000}
        ])
        .to_string(),
    )
    .unwrap();

    let postcodes = dir.path().join("Malaysia-Postcodes.xlsx");
    let workbook = write_workbook(
        "Postcodes",
        &[
            vec![json!("Postcode"), json!("City"), json!("State")],
            vec![json!(43000), json!("Kajang"), json!("Selangor")],
            vec![json!(1000), json!("Kangar"), json!("Perlis")],
        ],
    )
    .unwrap();
    std::fs::write(&postcodes, workbook).unwrap();

    (
        input.to_str().unwrap().to_string(),
        postcodes.to_str().unwrap().to_string(),
    )
}

fn config_toml(input: &str, postcodes: &str, output: &str) -> String {
    format!(
        r#"
[pipeline]
name = "weekly-ipr"
version = "1.0.0"

[source]
input_file = "{input}"

[extract]
max_records = 3

[transform]
reference_year = 2024
program_mapping = {{ food = "INSAN", fishery = "INSAN-NELAYAN" }}
placeholder_columns = ["miskin"]

[postcode]
files = ["{postcodes}"]

[geocoding]
enabled = false

[load]
output_path = "{output}"
output_formats = ["json"]
base_name = "ipr_week34"

[load.compression]
enabled = true
filename = "week34.zip"
"#
    )
}

#[tokio::test]
async fn test_toml_configured_pipeline() {
    let temp_dir = TempDir::new().unwrap();
    let (input, postcodes) = write_inputs(&temp_dir);
    let output = temp_dir.path().join("out");
    let output = output.to_str().unwrap();

    let config_path = temp_dir.path().join("ipr-etl.toml");
    std::fs::write(&config_path, config_toml(&input, &postcodes, output)).unwrap();

    let config = TomlConfig::from_file(&config_path).unwrap();
    config.validate().unwrap();
    assert!(!config.geocoding().is_active());

    let storage = LocalStorage::new(config.output_path().to_string());
    let pipeline = IprPipeline::new(storage, config).unwrap();
    let output_file = EtlEngine::new(pipeline).run().await.unwrap();
    assert!(output_file.ends_with("week34.zip"));

    let zip_data = std::fs::read(temp_dir.path().join("out").join("week34.zip")).unwrap();
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(zip_data)).unwrap();

    let mut content = String::new();
    archive
        .by_name("ipr_week34.json")
        .unwrap()
        .read_to_string(&mut content)
        .unwrap();
    let rows: Value = serde_json::from_str(&content).unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 3);

    assert_eq!(rows[0]["program"], json!("INSAN"));
    assert_eq!(rows[0]["age"], json!(36));
    assert_eq!(rows[0]["district"], json!("Kajang"));
    assert_eq!(rows[0]["address"], json!("TAMAN MEWAH, MALAYSIA"));
    assert_eq!(rows[0]["miskin"], json!(""));
    assert!(rows[0].get("str_mof").is_none());

    assert_eq!(rows[1]["program"], json!("INSAN-NELAYAN"));
    assert_eq!(rows[1]["age"], json!("IC ERROR"));
    assert_eq!(rows[1]["district"], Value::Null);

    assert_eq!(rows[2]["program"], json!("INTAN"));
    assert_eq!(rows[2]["age"], json!(23));
    assert_eq!(rows[2]["postcode"], json!("01000"));
    assert_eq!(rows[2]["district"], json!("Kangar"));
    assert_eq!(rows[2]["address"], Value::Null);

    let mut report = String::new();
    archive
        .by_name("processing_report.json")
        .unwrap()
        .read_to_string(&mut report)
        .unwrap();
    let report: Value = serde_json::from_str(&report).unwrap();
    assert_eq!(report["unmatched_postcodes"], json!(1));
    assert_eq!(report["ic_errors"], json!(1));
    assert_eq!(report["geocode_summary"]["skipped"], json!(3));
}

#[tokio::test]
async fn test_max_records_limits_the_upload() {
    let temp_dir = TempDir::new().unwrap();
    let (input, postcodes) = write_inputs(&temp_dir);
    let output = temp_dir.path().join("out");

    let content = config_toml(&input, &postcodes, output.to_str().unwrap())
        .replace("max_records = 3", "max_records = 1")
        .replace("[load.compression]\nenabled = true", "[load.compression]\nenabled = false");
    let config = TomlConfig::from_toml_str(&content).unwrap();
    assert_eq!(config.output_settings().zip_filename, None);

    let storage = LocalStorage::new(config.output_path().to_string());
    let pipeline = IprPipeline::new(storage, config).unwrap();
    let output_file = EtlEngine::new(pipeline).run().await.unwrap();
    assert!(output_file.ends_with("ipr_week34.json"));

    let rows: Value =
        serde_json::from_slice(&std::fs::read(output.join("ipr_week34.json")).unwrap()).unwrap();
    assert_eq!(rows.as_array().unwrap().len(), 1);
    assert!(output.join("processing_report.json").exists());
}
