use multilingual_m2m::m2m_100::{M2M100Config, M2M100Model};
use multilingual_m2m::Config;
use std::io::Write;
use tch::{nn, Device, Kind, Tensor};

fn tiny_config() -> anyhow::Result<M2M100Config> {
    let mut config_file = tempfile::NamedTempFile::new()?;
    write!(
        config_file,
        r#"{{
            "activation_function": "relu",
            "architectures": ["M2M100ForConditionalGeneration"],
            "attention_dropout": 0.1,
            "activation_dropout": 0.0,
            "bos_token_id": 0,
            "d_model": 16,
            "decoder_attention_heads": 2,
            "decoder_ffn_dim": 32,
            "decoder_layers": 2,
            "decoder_start_token_id": 2,
            "dropout": 0.1,
            "encoder_attention_heads": 2,
            "encoder_ffn_dim": 32,
            "encoder_layers": 2,
            "eos_token_id": 2,
            "max_position_embeddings": 64,
            "model_type": "m2m_100",
            "pad_token_id": 1,
            "scale_embedding": true,
            "vocab_size": 40,
            "output_hidden_states": true
        }}"#
    )?;
    config_file.flush()?;
    Ok(M2M100Config::from_file(config_file.path())?)
}

fn input_ids() -> Tensor {
    Tensor::of_slice(&[0i64, 12, 27, 5, 9, 2, 0, 33, 6, 2, 1, 1]).view([2, 6])
}

#[test]
fn m2m100_model_forward() -> anyhow::Result<()> {
    let vs = nn::VarStore::new(Device::Cpu);
    let config = tiny_config()?;
    let model = M2M100Model::new(vs.root(), &config);
    let attention_mask = input_ids().ne(1).to_kind(Kind::Int64);

    let output = model.forward_t(
        Some(&input_ids()),
        Some(&attention_mask),
        None,
        None,
        None,
        None,
        false,
    )?;

    assert_eq!(output.decoder_output.size(), vec![2, 6, 16]);
    let encoder_hidden_state = output
        .encoder_hidden_state
        .ok_or_else(|| anyhow::anyhow!("encoder hidden state not returned"))?;
    assert_eq!(encoder_hidden_state.size(), vec![2, 6, 16]);
    assert_eq!(output.cache.map(|cache| cache.len()), Some(2));
    assert_eq!(
        output
            .all_decoder_hidden_states
            .map(|hidden_states| hidden_states.len()),
        Some(3)
    );
    assert!(vs.variables().contains_key("shared.weight"));
    assert!(vs
        .variables()
        .contains_key("decoder.layers.1.encoder_attn.out_proj.bias"));
    Ok(())
}

#[test]
fn m2m100_incremental_decoding() -> anyhow::Result<()> {
    let vs = nn::VarStore::new(Device::Cpu);
    let config = tiny_config()?;
    let model = M2M100Model::new(vs.root(), &config);
    let decoder_input_ids = Tensor::of_slice(&[2i64, 7, 21, 14]).view([1, 4]);
    let input_ids = input_ids().narrow(0, 0, 1);

    let full_output = model.forward_t(
        Some(&input_ids),
        None,
        Some(&decoder_input_ids),
        None,
        None,
        None,
        false,
    )?;
    let encoder_hidden_state = full_output
        .encoder_hidden_state
        .ok_or_else(|| anyhow::anyhow!("encoder hidden state not returned"))?;

    let mut cache = None;
    let mut last_hidden_state = None;
    for position in 0..4 {
        let step_input = decoder_input_ids.narrow(1, position, 1);
        let output = model.forward_t(
            None,
            None,
            Some(&step_input),
            Some(&encoder_hidden_state),
            None,
            cache,
            false,
        )?;
        cache = output.cache;
        last_hidden_state = Some(output.decoder_output);
    }

    let last_hidden_state =
        last_hidden_state.ok_or_else(|| anyhow::anyhow!("no decoding step"))?;
    let expected = full_output.decoder_output.narrow(1, 3, 1);
    let difference = (last_hidden_state - expected).abs().max().double_value(&[]);
    assert!(difference < 1e-5);
    Ok(())
}
