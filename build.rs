use std::process::Command;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("espidf") {
        embuild::espidf::sysenv::output();
    }
    // some info on the build
    let commit_hash = Command::new("git")
        .args(["describe", "--always", "--dirty=-modified"])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .map(|rev| rev.trim().to_owned())
        .unwrap_or_else(|| "unknown".to_owned());
    println!("cargo:rustc-env=BUILD_GIT_REV={commit_hash}");
    let now = chrono::Local::now();
    println!("cargo:rustc-env=BUILD_DATETIME_PRETTY={}", now.to_rfc2822());
    println!("cargo:rustc-env=BUILD_DATETIME={}", now.to_rfc3339());
    for var in [
        "PLANTSENSOR_WIFI_SSID",
        "PLANTSENSOR_WIFI_PASS",
        "PLANTSENSOR_MQTT_URI",
        "PLANTSENSOR_MQTT_USER",
        "PLANTSENSOR_MQTT_PASS",
    ] {
        println!("cargo:rerun-if-env-changed={var}");
    }
    Ok(())
}
