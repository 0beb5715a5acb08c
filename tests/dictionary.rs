use multilingual_m2m::multilingual::{
    Dictionary, LanguageFamilies, LanguagePair, MultilingualConfig, TranslationTask,
};
use multilingual_m2m::{Activation, Config, MultilingualError};
use std::io::Write;

#[test]
fn dictionary_special_symbols() {
    let dictionary = Dictionary::new();

    assert_eq!(dictionary.len(), 4);
    assert_eq!(dictionary.bos(), 0);
    assert_eq!(dictionary.pad(), 1);
    assert_eq!(dictionary.eos(), 2);
    assert_eq!(dictionary.unk(), 3);
    assert_eq!(dictionary.symbol(2), Some("</s>"));
}

#[test]
fn dictionary_from_reader() -> anyhow::Result<()> {
    let content = "▁the 1061\n▁de 971\n, 802\n\n__en__ 1\n";

    let dictionary = Dictionary::from_reader(content.as_bytes())?;

    assert_eq!(dictionary.len(), 8);
    assert_eq!(dictionary.index("▁the"), 4);
    assert_eq!(dictionary.index(","), 6);
    assert_eq!(dictionary.index("__en__"), 7);
    assert_eq!(dictionary.count(5), Some(971));
    assert_eq!(dictionary.index("▁unseen"), dictionary.unk());
    assert_eq!(dictionary.get("▁unseen"), None);
    Ok(())
}

#[test]
fn dictionary_overwrite_flag() -> anyhow::Result<()> {
    let dictionary = Dictionary::from_reader("▁a 10\n</s> 3 #fairseq:overwrite\n".as_bytes())?;
    assert_eq!(dictionary.len(), 5);
    assert_eq!(dictionary.count(dictionary.eos()), Some(3));

    let duplicate = Dictionary::from_reader("▁a 10\n▁a 3\n".as_bytes());
    assert!(matches!(duplicate, Err(MultilingualError::ParseError(_))));

    let malformed = Dictionary::from_reader("▁a ten\n".as_bytes());
    assert!(matches!(malformed, Err(MultilingualError::ParseError(_))));
    Ok(())
}

#[test]
fn task_from_dictionary_dir() -> anyhow::Result<()> {
    let directory = tempfile::tempdir()?;
    for lang in &["en", "de"] {
        let mut f = std::fs::File::create(directory.path().join(format!("dict.{}.txt", lang)))?;
        writeln!(f, "▁{} 10", lang)?;
    }
    let lang_pairs = LanguagePair::parse_list("en-de, de-en")?;

    let task = TranslationTask::from_dictionary_dir(directory.path(), lang_pairs)?;

    assert_eq!(task.langs(), vec!["de".to_string(), "en".to_string()]);
    assert_eq!(task.source_languages(), vec!["en", "de"]);
    assert_eq!(task.dictionary("de")?.index("▁de"), 4);

    let missing = TranslationTask::from_dictionary_dir(
        directory.path(),
        LanguagePair::parse_list("en-fr")?,
    );
    assert!(matches!(missing, Err(MultilingualError::IOError(_))));
    Ok(())
}

#[test]
fn task_requires_language_pairs() -> anyhow::Result<()> {
    let mut dictionaries = std::collections::HashMap::new();
    dictionaries.insert("en".to_string(), Dictionary::new());
    dictionaries.insert("de".to_string(), Dictionary::new());

    let empty = TranslationTask::new(vec![], dictionaries.clone());
    assert!(matches!(
        empty,
        Err(MultilingualError::InvalidConfigurationError(_))
    ));

    let task = TranslationTask::new(LanguagePair::parse_list("en-de")?, dictionaries)?;
    assert_eq!(task.lang_pairs(), &[LanguagePair::new("en", "de")][..]);
    assert_eq!(task.dictionaries().len(), 2);
    Ok(())
}

#[test]
fn language_pair_parsing() -> anyhow::Result<()> {
    let pair: LanguagePair = "en-de".parse()?;
    assert_eq!(pair, LanguagePair::new("en", "de"));
    assert_eq!(pair.to_string(), "en-de");

    assert!("en".parse::<LanguagePair>().is_err());
    assert!("en-de-fr".parse::<LanguagePair>().is_err());
    assert!("-de".parse::<LanguagePair>().is_err());
    assert_eq!(LanguagePair::parse_list("en-de,,fr-en,")?.len(), 2);

    let pairs: Vec<LanguagePair> = serde_json::from_str(r#"["en-de", "de-en"]"#)?;
    assert_eq!(pairs[1], LanguagePair::new("de", "en"));
    Ok(())
}

#[test]
fn language_families() -> anyhow::Result<()> {
    let mut config_file = tempfile::NamedTempFile::new()?;
    write!(
        config_file,
        r#"[{{"name": "family_1", "languages": ["de", "nl"]}},
            {{"name": "family_12", "languages": ["nl", "af"]}}]"#
    )?;
    config_file.flush()?;

    let families = LanguageFamilies::from_file(config_file.path())?;

    assert_eq!(families.iter().count(), 2);
    assert_eq!(families.family_of("nl"), "family_1");
    assert_eq!(families.family_of("af"), "family_12");
    assert_eq!(families.family_of("ja"), "ja");
    assert_eq!(LanguageFamilies::rank("family_12"), Some(12));
    assert_eq!(LanguageFamilies::rank("romance"), None);
    families.validate()?;

    let invalid: LanguageFamilies =
        serde_json::from_str(r#"[{"name": "family.1", "languages": ["de"]}]"#)?;
    assert!(invalid.validate().is_err());
    Ok(())
}

#[test]
fn multilingual_config_defaults() -> anyhow::Result<()> {
    let mut config_file = tempfile::NamedTempFile::new()?;
    write!(
        config_file,
        r#"{{"encoder_layers": 2, "decoder_layers": 3, "share_decoders": true,
            "activation_fn": "gelu", "pipeline": {{"balance": [2, 3], "chunks": 4}}}}"#
    )?;
    config_file.flush()?;

    let config = MultilingualConfig::from_file(config_file.path())?;

    assert_eq!(config.encoder_layers, 2);
    assert_eq!(config.encoder_embed_dim, 512);
    assert_eq!(config.activation_fn, Activation::gelu);
    assert_eq!(config.pipeline.chunks, 4);
    assert!(!config.share_decoder_embeddings);
    assert!(config.normalized().share_decoder_embeddings);
    config.validate()?;

    let unbalanced = MultilingualConfig {
        encoder_layers: 6,
        ..config.clone()
    };
    assert!(unbalanced.validate().is_err());

    let shared = MultilingualConfig {
        share_all_embeddings: true,
        ..MultilingualConfig::base()
    };
    assert!(shared.normalized().share_decoder_input_output_embed);
    assert_eq!(MultilingualConfig::m2m_418m().encoder_embed_dim, 1024);
    Ok(())
}
