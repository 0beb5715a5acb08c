use multilingual_m2m::m2m_100::{M2M100Config, M2M100Model};
use multilingual_m2m::multilingual::embeddings::build_embedding;
use multilingual_m2m::multilingual::{
    Dictionary, LanguageFamilies, LanguageFamily, LanguagePair, MultilingualConfig,
    MultilingualM2M100Model, PipelineConfig, PretrainedM2M, TranslationTask,
};
use multilingual_m2m::{Activation, MultilingualError};
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use tch::{nn, Device, Kind, Tensor};

const SYMBOLS: [&str; 12] = [
    "▁the", "▁a", "▁de", "▁het", "▁le", "▁la", "s", "n", "t", "e", "▁in", "▁und",
];

fn dictionary() -> Dictionary {
    let mut dictionary = Dictionary::new();
    for (count, symbol) in SYMBOLS.iter().enumerate() {
        dictionary.add_symbol(symbol, 100 - count as i64);
    }
    dictionary
}

fn tiny_config() -> MultilingualConfig {
    MultilingualConfig {
        encoder_embed_dim: 16,
        encoder_ffn_embed_dim: 32,
        encoder_attention_heads: 2,
        encoder_layers: 1,
        decoder_embed_dim: 16,
        decoder_ffn_embed_dim: 32,
        decoder_attention_heads: 2,
        decoder_layers: 1,
        max_source_positions: 64,
        max_target_positions: 64,
        ..MultilingualConfig::base()
    }
}

fn families() -> LanguageFamilies {
    LanguageFamilies::new(vec![
        LanguageFamily {
            name: "family_1".to_string(),
            languages: vec!["de".to_string(), "nl".to_string()],
        },
        LanguageFamily {
            name: "family_2".to_string(),
            languages: vec!["fr".to_string(), "es".to_string()],
        },
    ])
}

fn task(lang_pairs: &str) -> anyhow::Result<TranslationTask> {
    let lang_pairs = LanguagePair::parse_list(lang_pairs)?;
    let mut dictionaries = HashMap::new();
    for pair in &lang_pairs {
        dictionaries.insert(pair.source.clone(), dictionary());
        dictionaries.insert(pair.target.clone(), dictionary());
    }
    Ok(TranslationTask::new(lang_pairs, dictionaries)?)
}

fn tokens(batch_size: i64, length: i64) -> Tensor {
    let ids = Tensor::arange(batch_size * length, (Kind::Int64, Device::Cpu))
        .remainder(SYMBOLS.len() as i64)
        + 4;
    ids.view([batch_size, length])
}

fn max_difference(first: &Tensor, second: &Tensor) -> f64 {
    (first - second).abs().max().double_value(&[])
}

#[test]
fn multilingual_one_module_per_family() -> anyhow::Result<()> {
    let vs = nn::VarStore::new(Device::Cpu);
    let task = task("en-de,en-nl,en-fr,en-es,de-en,nl-en")?;
    let model = MultilingualM2M100Model::build(&vs, &tiny_config(), &task, &families())?;

    assert_eq!(model.num_encoders(), 2);
    assert_eq!(model.num_decoders(), 3);
    assert_eq!(model.encoder_family("nl"), Some("encoders.family_1"));
    assert_eq!(model.encoder_family("en"), Some("encoders.en"));
    assert_eq!(model.decoder_family("es"), Some("decoders.family_2"));
    assert_eq!(model.decoder_family("it"), None);

    let variables = vs.variables();
    assert!(variables.contains_key("encoders.family_1.layers.0.fc1.weight"));
    assert!(variables.contains_key("decoders.family_2.output_projection.weight"));
    assert!(variables.contains_key("embeddings.encoder.family_1.weight"));
    assert!(variables.contains_key("embeddings.decoder.en.weight"));
    assert!(!variables.contains_key("encoders.de.layers.0.fc1.weight"));
    assert_eq!(
        variables["embeddings.decoder.family_2.weight"].size(),
        vec![SYMBOLS.len() as i64 + 4, 16]
    );
    Ok(())
}

#[test]
fn multilingual_shared_encoder_and_embeddings() -> anyhow::Result<()> {
    let vs = nn::VarStore::new(Device::Cpu);
    let config = MultilingualConfig {
        share_encoders: true,
        share_decoder_embeddings: true,
        ..tiny_config()
    };
    let task = task("de-en,fr-en,en-de,en-fr")?;
    let model = MultilingualM2M100Model::build(&vs, &config, &task, &families())?;

    assert_eq!(model.num_encoders(), 1);
    assert_eq!(model.num_decoders(), 3);
    assert_eq!(model.encoder_family("fr"), model.encoder_family("de"));

    let variables = vs.variables();
    assert!(variables.contains_key("embeddings.shared_encoder.weight"));
    assert!(variables.contains_key("embeddings.shared_decoder.weight"));
    assert!(!variables
        .keys()
        .any(|name| name.starts_with("embeddings.encoder.")
            || name.starts_with("embeddings.decoder.")));
    Ok(())
}

#[test]
fn multilingual_share_all_embeddings() -> anyhow::Result<()> {
    let vs = nn::VarStore::new(Device::Cpu);
    let config = MultilingualConfig {
        share_all_embeddings: true,
        ..tiny_config()
    };
    let task = task("en-de,de-en")?;
    let model = MultilingualM2M100Model::build(&vs, &config, &task, &families())?;

    let variables = vs.variables();
    let embeddings = variables
        .keys()
        .filter(|name| name.starts_with("embeddings."))
        .collect::<Vec<&String>>();
    assert_eq!(embeddings, vec!["embeddings.shared.weight"]);
    assert!(!variables
        .keys()
        .any(|name| name.ends_with("output_projection.weight")));

    let logits = model.forward_t(
        &LanguagePair::new("en", "de"),
        &tokens(2, 5),
        None,
        &tokens(2, 3),
        false,
    )?;
    assert_eq!(logits.size(), vec![2, 3, SYMBOLS.len() as i64 + 4]);
    Ok(())
}

#[test]
fn multilingual_share_all_embeddings_dimension_mismatch() -> anyhow::Result<()> {
    let vs = nn::VarStore::new(Device::Cpu);
    let config = MultilingualConfig {
        share_all_embeddings: true,
        decoder_embed_dim: 32,
        ..tiny_config()
    };
    let task = task("en-de")?;

    let result = MultilingualM2M100Model::build(&vs, &config, &task, &families());

    assert!(matches!(
        result,
        Err(MultilingualError::InvalidConfigurationError(_))
    ));
    assert!(vs.variables().is_empty());
    Ok(())
}

#[test]
fn multilingual_share_all_embeddings_decoder_embed_path() -> anyhow::Result<()> {
    let vs = nn::VarStore::new(Device::Cpu);
    let config = MultilingualConfig {
        share_all_embeddings: true,
        decoder_embed_path: Some(PathBuf::from("decoder_embeddings.txt")),
        ..tiny_config()
    };
    let task = task("en-de")?;

    let result = MultilingualM2M100Model::build(&vs, &config, &task, &families());

    assert!(matches!(
        result,
        Err(MultilingualError::InvalidConfigurationError(_))
    ));
    assert!(vs.variables().is_empty());
    Ok(())
}

#[test]
fn multilingual_family_requires_joined_dictionary() -> anyhow::Result<()> {
    let vs = nn::VarStore::new(Device::Cpu);
    let lang_pairs = LanguagePair::parse_list("en-de,en-nl")?;
    let mut nl_dictionary = dictionary();
    nl_dictionary.add_symbol("▁een", 1);
    let mut dictionaries = HashMap::new();
    dictionaries.insert("en".to_string(), dictionary());
    dictionaries.insert("de".to_string(), dictionary());
    dictionaries.insert("nl".to_string(), nl_dictionary);
    let task = TranslationTask::new(lang_pairs, dictionaries)?;

    let result = MultilingualM2M100Model::build(&vs, &tiny_config(), &task, &families());

    assert!(matches!(
        result,
        Err(MultilingualError::InvalidConfigurationError(_))
    ));
    Ok(())
}

#[test]
fn multilingual_forward_micro_batches() -> anyhow::Result<()> {
    let lang_pair = LanguagePair::new("en", "fr");
    let task = task("en-fr,en-de")?;
    let vs = nn::VarStore::new(Device::Cpu);
    let model = MultilingualM2M100Model::build(&vs, &tiny_config(), &task, &families())?;
    let chunked_vs = nn::VarStore::new(Device::Cpu);
    let chunked_config = MultilingualConfig {
        pipeline: PipelineConfig {
            balance: None,
            chunks: 2,
        },
        ..tiny_config()
    };
    let chunked_model =
        MultilingualM2M100Model::build(&chunked_vs, &chunked_config, &task, &families())?;
    chunked_model.load_state_dict(model.state_dict(), true)?;

    let input_ids = tokens(3, 6);
    let attention_mask = Tensor::ones(&[3, 6], (Kind::Int64, Device::Cpu));
    let decoder_input_ids = tokens(3, 4);
    let logits = model.forward_t(
        &lang_pair,
        &input_ids,
        Some(&attention_mask),
        &decoder_input_ids,
        false,
    )?;
    let chunked_logits = chunked_model.forward_t(
        &lang_pair,
        &input_ids,
        Some(&attention_mask),
        &decoder_input_ids,
        false,
    )?;

    assert_eq!(logits.size(), vec![3, 4, SYMBOLS.len() as i64 + 4]);
    assert_eq!(chunked_logits.size(), logits.size());
    assert!(max_difference(&logits, &chunked_logits) < 1e-5);
    Ok(())
}

#[test]
fn multilingual_unknown_language_pair() -> anyhow::Result<()> {
    let vs = nn::VarStore::new(Device::Cpu);
    let model = MultilingualM2M100Model::build(&vs, &tiny_config(), &task("en-de")?, &families())?;

    let result = model.forward_t(
        &LanguagePair::new("de", "en"),
        &tokens(1, 4),
        None,
        &tokens(1, 2),
        false,
    );

    assert!(matches!(result, Err(MultilingualError::ValueError(_))));
    Ok(())
}

#[test]
fn multilingual_generate() -> anyhow::Result<()> {
    let vs = nn::VarStore::new(Device::Cpu);
    let model = MultilingualM2M100Model::build(&vs, &tiny_config(), &task("en-de")?, &families())?;

    let output = model.generate(&LanguagePair::new("en", "de"), &tokens(2, 5), None, 6, Some(7))?;

    let size = output.size();
    assert_eq!(size[0], 2);
    assert!(size[1] >= 2 && size[1] <= 7);
    assert_eq!(output.int64_value(&[0, 0]), dictionary().eos());
    assert_eq!(output.int64_value(&[1, 1]), 7);
    Ok(())
}

#[test]
fn multilingual_state_dict_names() -> anyhow::Result<()> {
    let vs = nn::VarStore::new(Device::Cpu);
    let model = MultilingualM2M100Model::build(
        &vs,
        &tiny_config(),
        &task("en-de,en-nl")?,
        &families(),
    )?;

    let state = model.state_dict();

    for pair in &["en-de", "en-nl"] {
        for name in &[
            "encoder.embed_tokens.weight",
            "encoder.layers.0.fc1.weight",
            "encoder.layer_norm.bias",
            "decoder.embed_tokens.weight",
            "decoder.layers.0.encoder_attn.k_proj.weight",
            "decoder.output_projection.weight",
        ] {
            assert!(state.contains_key(&format!("models.{}.{}", pair, name)));
        }
    }
    assert!(state.keys().all(|key| key.starts_with("models.en-")));
    Ok(())
}

#[test]
fn multilingual_load_state_dict_filters_language_pairs() -> anyhow::Result<()> {
    let source_vs = nn::VarStore::new(Device::Cpu);
    let source_model = MultilingualM2M100Model::build(
        &source_vs,
        &tiny_config(),
        &task("en-de,en-fr,fr-en")?,
        &families(),
    )?;
    let vs = nn::VarStore::new(Device::Cpu);
    let model = MultilingualM2M100Model::build(&vs, &tiny_config(), &task("en-de")?, &families())?;

    let state = source_model.state_dict();
    let filtered = model.filter_state_dict(source_model.state_dict())?;
    assert!(filtered.len() < state.len());
    assert!(filtered.keys().all(|key| key.starts_with("models.en-de.")));

    model.load_state_dict(state, true)?;
    assert!(
        max_difference(
            &vs.variables()["decoders.family_1.layers.0.fc2.weight"],
            &source_vs.variables()["decoders.family_1.layers.0.fc2.weight"],
        ) < 1e-12
    );
    assert!(
        max_difference(
            &vs.variables()["embeddings.encoder.en.weight"],
            &source_vs.variables()["embeddings.encoder.en.weight"],
        ) < 1e-12
    );
    Ok(())
}

#[test]
fn multilingual_load_state_dict_errors() -> anyhow::Result<()> {
    let vs = nn::VarStore::new(Device::Cpu);
    let model = MultilingualM2M100Model::build(&vs, &tiny_config(), &task("en-de")?, &families())?;

    let mut state = model.state_dict();
    state.insert(
        "decoder.layers.0.fc1.weight".to_string(),
        Tensor::zeros(&[32, 16], (Kind::Float, Device::Cpu)),
    );
    assert!(matches!(
        model.filter_state_dict(state),
        Err(MultilingualError::ValueError(_))
    ));

    let mut state = model.state_dict();
    state.remove("models.en-de.encoder.layer_norm.weight");
    assert!(model.load_state_dict(state, true).is_err());

    let mut state = model.state_dict();
    state.remove("models.en-de.encoder.layer_norm.weight");
    model.load_state_dict(state, false)?;

    let mut state = model.state_dict();
    state.insert(
        "models.en-de.encoder.layer_norm.weight".to_string(),
        Tensor::ones(&[8], (Kind::Float, Device::Cpu)),
    );
    assert!(matches!(
        model.load_state_dict(state, false),
        Err(MultilingualError::ValueError(_))
    ));
    Ok(())
}

#[test]
fn multilingual_load_state_dict_shape_error_keeps_weights() -> anyhow::Result<()> {
    let vs = nn::VarStore::new(Device::Cpu);
    let model = MultilingualM2M100Model::build(&vs, &tiny_config(), &task("en-de")?, &families())?;
    let before = model
        .variables()
        .iter()
        .map(|(name, tensor)| (name.clone(), tensor.copy()))
        .collect::<HashMap<String, Tensor>>();

    let mut state = model
        .state_dict()
        .into_iter()
        .map(|(key, tensor)| (key, tensor.full_like(7.0)))
        .collect::<HashMap<String, Tensor>>();
    state.insert(
        "models.en-de.encoder.layer_norm.weight".to_string(),
        Tensor::ones(&[8], (Kind::Float, Device::Cpu)),
    );

    assert!(matches!(
        model.load_state_dict(state, false),
        Err(MultilingualError::ValueError(_))
    ));
    for (name, tensor) in model.variables() {
        assert_eq!(max_difference(tensor, &before[name]), 0.0, "{} changed", name);
    }
    Ok(())
}

#[test]
fn multilingual_load_state_dict_first_pair_wins() -> anyhow::Result<()> {
    let lang_pairs = "en-de,en-nl";
    let source_vs = nn::VarStore::new(Device::Cpu);
    let source = MultilingualM2M100Model::build(
        &source_vs,
        &tiny_config(),
        &task(lang_pairs)?,
        &LanguageFamilies::default(),
    )?;
    tch::no_grad(|| {
        for (name, tensor) in source.variables() {
            let mut tensor = tensor.shallow_clone();
            if name.starts_with("decoders.de.") {
                let _ = tensor.fill_(1.0);
            } else if name.starts_with("decoders.nl.") {
                let _ = tensor.fill_(2.0);
            }
        }
    });

    let target_vs = nn::VarStore::new(Device::Cpu);
    let target =
        MultilingualM2M100Model::build(&target_vs, &tiny_config(), &task(lang_pairs)?, &families())?;
    assert_eq!(target.num_decoders(), 1);

    for _ in 0..4 {
        target.load_state_dict(source.state_dict(), true)?;
        let fc1 = &target.variables()["decoders.family_1.layers.0.fc1.weight"];
        assert_eq!(max_difference(fc1, &fc1.ones_like()), 0.0);
    }
    Ok(())
}

fn pretrained_config(vocab_size: i64) -> M2M100Config {
    M2M100Config {
        vocab_size,
        max_position_embeddings: 64,
        encoder_layers: 1,
        encoder_attention_heads: 2,
        encoder_ffn_dim: 32,
        decoder_layers: 1,
        decoder_ffn_dim: 32,
        decoder_attention_heads: 2,
        activation_function: Some(Activation::relu),
        d_model: 16,
        dropout: 0.1,
        activation_dropout: 0.0,
        attention_dropout: 0.0,
        scale_embedding: Some(true),
        bos_token_id: Some(0),
        eos_token_id: Some(2),
        pad_token_id: Some(1),
        decoder_start_token_id: Some(2),
        cross_attention_dim: None,
        output_attentions: None,
        output_hidden_states: None,
        output_past: None,
    }
}

#[test]
fn multilingual_pretrained_encoder_initialization() -> anyhow::Result<()> {
    let pretrained_vs = nn::VarStore::new(Device::Cpu);
    let _ = M2M100Model::new(
        pretrained_vs.root(),
        &pretrained_config(dictionary().len()),
    );
    let checkpoint = tempfile::Builder::new().suffix(".ot").tempfile()?;
    pretrained_vs.save(checkpoint.path())?;

    let config = MultilingualConfig {
        pretrained_m2m_checkpoint: Some(checkpoint.path().to_path_buf()),
        init_encoder_only: true,
        ..tiny_config()
    };
    let vs = nn::VarStore::new(Device::Cpu);
    let _ = MultilingualM2M100Model::build(&vs, &config, &task("en-de,nl-de")?, &families())?;

    let pretrained = pretrained_vs.variables();
    let variables = vs.variables();
    for family in &["en", "family_1"] {
        assert!(
            max_difference(
                &variables[&format!("encoders.{}.layers.0.self_attn.q_proj.weight", family)],
                &pretrained["encoder.layers.0.self_attn.q_proj.weight"],
            ) < 1e-12
        );
        assert!(
            max_difference(
                &variables[&format!("embeddings.encoder.{}.weight", family)],
                &pretrained["shared.weight"],
            ) < 1e-12
        );
    }
    assert!(
        max_difference(
            &variables["decoders.family_1.layers.0.fc1.weight"],
            &pretrained["decoder.layers.0.fc1.weight"],
        ) > 1e-6
    );
    Ok(())
}

#[test]
fn multilingual_pretrained_init_with_both_restrictions() -> anyhow::Result<()> {
    let vs = nn::VarStore::new(Device::Cpu);
    let config = MultilingualConfig {
        pretrained_m2m_checkpoint: Some(PathBuf::from("m2m100.ot")),
        init_encoder_only: true,
        init_decoder_only: true,
        ..tiny_config()
    };

    let result = MultilingualM2M100Model::build(&vs, &config, &task("en-de")?, &families());

    assert!(matches!(
        result,
        Err(MultilingualError::InvalidConfigurationError(_))
    ));
    Ok(())
}

#[test]
fn pretrained_embedding_follows_dictionary() -> anyhow::Result<()> {
    let mut pretrained_dictionary = Dictionary::new();
    for symbol in &["▁und", "▁the", "▁le"] {
        pretrained_dictionary.add_symbol(symbol, 1);
    }
    let weights = Tensor::arange(7, (Kind::Float, Device::Cpu))
        .unsqueeze(1)
        .repeat(&[1, 4]);
    let pretrained = PretrainedM2M::new(
        vec![("model.shared.weight".to_string(), weights)],
        Some(pretrained_dictionary),
    );
    assert!(pretrained.get("shared.weight").is_some());

    let vs = nn::VarStore::new(Device::Cpu);
    let dictionary = dictionary();
    let embedding = build_embedding(&vs.root() / "embeddings", &dictionary, 4, None)?;
    let rows = pretrained.init_embedding(&dictionary, &embedding)?;

    assert_eq!(rows, 7);
    assert_eq!(embedding.ws.double_value(&[dictionary.index("▁und"), 0]), 4.0);
    assert_eq!(embedding.ws.double_value(&[dictionary.index("▁the"), 3]), 5.0);
    assert_eq!(embedding.ws.double_value(&[dictionary.index("▁le"), 1]), 6.0);
    assert_eq!(embedding.ws.double_value(&[dictionary.eos(), 2]), 2.0);
    Ok(())
}

#[test]
fn embedding_from_text_file() -> anyhow::Result<()> {
    let mut embeddings_file = tempfile::NamedTempFile::new()?;
    writeln!(embeddings_file, "2 4")?;
    writeln!(embeddings_file, "▁the 0.5 0.25 -1 2")?;
    writeln!(embeddings_file, "▁unseen 1 1 1 1")?;
    writeln!(embeddings_file, "s -0.5 0 0 3")?;
    embeddings_file.flush()?;

    let vs = nn::VarStore::new(Device::Cpu);
    let dictionary = dictionary();
    let embedding = build_embedding(
        &vs.root() / "embeddings",
        &dictionary,
        4,
        Some(embeddings_file.path()),
    )?;

    assert_eq!(embedding.ws.size(), vec![dictionary.len(), 4]);
    assert_eq!(embedding.ws.double_value(&[dictionary.index("▁the"), 1]), 0.25);
    assert_eq!(embedding.ws.double_value(&[dictionary.index("s"), 3]), 3.0);
    Ok(())
}
