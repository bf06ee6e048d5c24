use hmmsuite::NgramClassifier;

#[test]
fn demo_intents() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/intents.json");
    let classifier = NgramClassifier::from_path(path).expect("failed to load intents");
    assert_eq!(classifier.intents().len(), 3);
    assert_eq!(classifier.predict("Hello, how are you?"), Some("greeting"));
    assert_eq!(classifier.predict("hey"), Some("greeting"));
}
