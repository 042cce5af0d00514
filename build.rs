use std::collections::HashSet;
use std::path::Path;

fn main() {
    let layout_path = Path::new("layouts/duke128.json");
    validate_layout_file(layout_path);
    set_build_dependencies();
}

fn validate_layout_file(layout_path: &Path) {
    // Ensure layout exists at build time
    assert!(
        layout_path.exists(),
        "\n\nLAYOUT BUILD ERROR: File not found\n\
         Path: {}\n\
         Please create the layout file before building.\n",
        layout_path.display()
    );

    let layout_contents = std::fs::read_to_string(layout_path).unwrap_or_else(|e| {
        panic!(
            "\n\nLAYOUT BUILD ERROR: Failed to read file\n\
             Path: {}\n\
             Error: {e}\n",
            layout_path.display()
        );
    });

    let layout: serde_json::Value = serde_json::from_str(&layout_contents).unwrap_or_else(|e| {
        panic!(
            "\n\nLAYOUT BUILD ERROR: Invalid JSON\n\
             Path: {}\n\
             Error: {e}\n\
             Hint: Check for missing commas, brackets, or invalid syntax.\n",
            layout_path.display()
        );
    });

    validate_layout_structure(&layout);
}

fn validate_layout_structure(layout: &serde_json::Value) {
    assert!(
        layout.is_object(),
        "\n\nLAYOUT BUILD ERROR: Root must be a JSON object\n\
         Got: {layout}\n"
    );

    let channels = layout
        .get("channels")
        .and_then(serde_json::Value::as_array)
        .unwrap_or_else(|| {
            panic!(
                "\n\nLAYOUT BUILD ERROR: Missing or invalid 'channels' field\n\
                 The layout must have a top-level 'channels' array.\n"
            );
        });

    assert!(
        !channels.is_empty(),
        "\n\nLAYOUT BUILD ERROR: 'channels' must not be empty\n"
    );

    let labels = validate_channels(channels);

    for field in ["recording_reference", "left_mastoid", "right_mastoid"] {
        let label = layout
            .get(field)
            .and_then(serde_json::Value::as_str)
            .unwrap_or_else(|| {
                panic!("\n\nLAYOUT BUILD ERROR: Missing '{field}' field\n");
            });
        assert!(
            labels.contains(label),
            "\n\nLAYOUT BUILD ERROR: '{field}' names '{label}', which is not a layout channel\n"
        );
    }

    if let Some(non_signal) = layout.get("non_signal").and_then(|v| v.as_array()) {
        for label in non_signal.iter().filter_map(serde_json::Value::as_str) {
            assert!(
                !labels.contains(label),
                "\n\nLAYOUT BUILD ERROR: non-signal channel '{label}' is also listed as a signal channel\n"
            );
        }
    }

    println!(
        "cargo:warning=Validated layout: {} signal channels",
        channels.len()
    );
}

fn validate_channels(channels: &[serde_json::Value]) -> HashSet<String> {
    let mut labels = HashSet::new();

    for (i, channel) in channels.iter().enumerate() {
        let label = channel
            .get("label")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_else(|| {
                panic!("\n\nLAYOUT BUILD ERROR: Channel at index {i} missing 'label' field\n");
            });

        assert!(
            labels.insert(label.to_string()),
            "\n\nLAYOUT BUILD ERROR: Duplicate channel label '{label}' (index {i})\n"
        );

        let hemisphere = channel.get("hemisphere").and_then(serde_json::Value::as_str);
        assert!(
            matches!(hemisphere, Some("left" | "right" | "midline")),
            "\n\nLAYOUT BUILD ERROR: Channel '{label}' (index {i}) has invalid 'hemisphere'\n\
             Expected one of: left, right, midline\n"
        );

        validate_position(channel, label, i);
    }

    labels
}

fn validate_position(channel: &serde_json::Value, label: &str, index: usize) {
    let position = channel
        .get("position")
        .and_then(serde_json::Value::as_array)
        .unwrap_or_else(|| {
            panic!(
                "\n\nLAYOUT BUILD ERROR: Channel '{label}' (index {index}) missing 'position' field\n"
            );
        });

    assert!(
        position.len() == 3 && position.iter().all(|c| c.as_f64().is_some_and(f64::is_finite)),
        "\n\nLAYOUT BUILD ERROR: Channel '{label}' (index {index}) position must be three finite numbers\n"
    );
}

fn set_build_dependencies() {
    // Tell cargo to rerun if layout changes
    println!("cargo:rerun-if-changed=layouts/duke128.json");

    // Tell cargo to rerun if build.rs changes
    println!("cargo:rerun-if-changed=build.rs");
}
