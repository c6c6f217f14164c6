//! Stable Diffusion inpainting on Candle.
//!
//! Loads a v1.5-family inpainting checkpoint (9-channel UNet) from the
//! Hugging Face hub. Each pass runs at 512x512 and the result is resized
//! back to the input dimensions.

use candle_core::{DType, Device, IndexOp, Module, Tensor};
use candle_transformers::models::stable_diffusion::{
    self, clip::ClipTextTransformer, unet_2d::UNet2DConditionModel, vae::AutoEncoderKL,
    StableDiffusionConfig,
};
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::path::PathBuf;
use tokenizers::Tokenizer;

use super::{InpaintModel, InpaintRequest};
use crate::error::InferenceError;

const VAE_SCALE: f64 = 0.18215;
const RENDER_SIZE: usize = 512;
const TOKENIZER_REPO: &str = "openai/clip-vit-base-patch32";
/// Latents, mask and masked-image latents.
const UNET_IN_CHANNELS: usize = 9;

fn unavailable(e: impl std::fmt::Display) -> InferenceError {
    InferenceError::ModelUnavailable(e.to_string())
}

pub struct CandleInpaintModel {
    device: Device,
    dtype: DType,
    config: StableDiffusionConfig,
    tokenizer: Tokenizer,
    pad_id: u32,
    clip: ClipTextTransformer,
    vae: AutoEncoderKL,
    unet: UNet2DConditionModel,
}

impl CandleInpaintModel {
    pub fn load(model_id: &str, use_cpu: bool) -> Result<Self, InferenceError> {
        let device = if use_cpu {
            Device::Cpu
        } else {
            Device::cuda_if_available(0).map_err(unavailable)?
        };
        let dtype = if device.is_cuda() {
            DType::F16
        } else {
            DType::F32
        };
        tracing::info!(model_id, device = ?device, dtype = ?dtype, "Loading inpainting pipeline");

        let config = StableDiffusionConfig::v1_5(None, Some(RENDER_SIZE), Some(RENDER_SIZE));
        let api = hf_hub::api::sync::Api::new().map_err(unavailable)?;
        let repo = api.model(model_id.to_string());
        let fetch = |file: &str| -> Result<PathBuf, InferenceError> {
            if dtype == DType::F16 {
                let half = file.replace(".safetensors", ".fp16.safetensors");
                match repo.get(&half) {
                    Ok(path) => return Ok(path),
                    Err(e) => tracing::warn!(file = %half, error = %e, "fp16 weights unavailable, using fp32"),
                }
            }
            repo.get(file).map_err(unavailable)
        };

        let tokenizer_path = api
            .model(TOKENIZER_REPO.to_string())
            .get("tokenizer.json")
            .map_err(unavailable)?;
        let tokenizer = Tokenizer::from_file(tokenizer_path).map_err(unavailable)?;
        let pad_token = config.clip.pad_with.as_deref().unwrap_or("<|endoftext|>");
        let pad_id = *tokenizer
            .get_vocab(true)
            .get(pad_token)
            .ok_or_else(|| unavailable(format!("pad token {} not in vocabulary", pad_token)))?;

        let clip = stable_diffusion::build_clip_transformer(
            &config.clip,
            fetch("text_encoder/model.safetensors")?,
            &device,
            dtype,
        )
        .map_err(unavailable)?;
        let vae = config
            .build_vae(fetch("vae/diffusion_pytorch_model.safetensors")?, &device, dtype)
            .map_err(unavailable)?;
        let unet = config
            .build_unet(
                fetch("unet/diffusion_pytorch_model.safetensors")?,
                &device,
                UNET_IN_CHANNELS,
                false,
                dtype,
            )
            .map_err(unavailable)?;

        tracing::info!(model_id, "Inpainting pipeline loaded");
        Ok(Self {
            device,
            dtype,
            config,
            tokenizer,
            pad_id,
            clip,
            vae,
            unet,
        })
    }

    fn encode_prompt(&self, prompt: &str) -> candle_core::Result<Tensor> {
        let max_len = self.config.clip.max_position_embeddings;
        let mut tokens = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| candle_core::Error::Msg(e.to_string()))?
            .get_ids()
            .to_vec();
        tokens.truncate(max_len);
        tokens.resize(max_len, self.pad_id);
        let tokens = Tensor::new(tokens.as_slice(), &self.device)?.unsqueeze(0)?;
        self.clip.forward(&tokens)
    }

    fn generate(&mut self, request: &InpaintRequest<'_>) -> candle_core::Result<RgbImage> {
        let params = request.params;
        let (width, height) = (self.config.width, self.config.height);
        let (orig_w, orig_h) = request.image.dimensions();
        if let Some(seed) = params.seed {
            self.device.set_seed(seed)?;
        }

        let use_guidance = params.guidance_scale > 1.0;
        let cond = self.encode_prompt(request.prompt)?;
        let text_embeddings = if use_guidance {
            Tensor::cat(&[self.encode_prompt("")?, cond], 0)?
        } else {
            cond
        }
        .to_dtype(self.dtype)?;

        let image = imageops::resize(request.image, width as u32, height as u32, FilterType::Triangle);
        let image = Tensor::from_vec(image.into_raw(), (height, width, 3), &self.device)?
            .permute((2, 0, 1))?
            .to_dtype(DType::F32)?
            .affine(2.0 / 255.0, -1.0)?
            .unsqueeze(0)?;
        let mask = imageops::resize(request.mask, width as u32, height as u32, FilterType::Nearest);
        let mask = Tensor::from_vec(mask.into_raw(), (1, 1, height, width), &self.device)?
            .to_dtype(DType::F32)?
            .affine(1.0 / 255.0, 0.0)?
            .ge(0.5)?
            .to_dtype(DType::F32)?;
        let masked_image = image.broadcast_mul(&mask.affine(-1.0, 1.0)?)?;

        let masked_latents =
            (self.vae.encode(&masked_image.to_dtype(self.dtype)?)?.sample()? * VAE_SCALE)?;
        let mask_latents = mask
            .upsample_nearest2d(height / 8, width / 8)?
            .to_dtype(self.dtype)?;
        let (mask_in, masked_in) = if use_guidance {
            (
                Tensor::cat(&[&mask_latents, &mask_latents], 0)?,
                Tensor::cat(&[&masked_latents, &masked_latents], 0)?,
            )
        } else {
            (mask_latents, masked_latents)
        };

        let mut scheduler = self.config.build_scheduler(params.steps)?;
        let timesteps = scheduler.timesteps().to_vec();
        let strength = params.strength.clamp(0.0, 1.0);
        let t_start = params
            .steps
            .saturating_sub((params.steps as f64 * strength) as usize)
            .min(timesteps.len().saturating_sub(1));

        let mut latents = if t_start > 0 {
            let init = (self.vae.encode(&image.to_dtype(self.dtype)?)?.sample()? * VAE_SCALE)?;
            let noise = init.randn_like(0.0, 1.0)?;
            scheduler.add_noise(&init, noise, timesteps[t_start])?
        } else {
            (Tensor::randn(0f32, 1f32, (1, 4, height / 8, width / 8), &self.device)?
                .to_dtype(self.dtype)?
                * scheduler.init_noise_sigma())?
        };

        for (index, &timestep) in timesteps.iter().enumerate().skip(t_start) {
            tracing::trace!(step = index + 1, total = timesteps.len(), "Denoising");
            let model_input = if use_guidance {
                Tensor::cat(&[&latents, &latents], 0)?
            } else {
                latents.clone()
            };
            let model_input = scheduler.scale_model_input(model_input, timestep)?;
            let model_input = Tensor::cat(&[&model_input, &mask_in, &masked_in], 1)?;

            let noise_pred = self
                .unet
                .forward(&model_input, timestep as f64, &text_embeddings)?;
            let noise_pred = if use_guidance {
                let chunks = noise_pred.chunk(2, 0)?;
                let (uncond, text) = (&chunks[0], &chunks[1]);
                (uncond + ((text - uncond)? * params.guidance_scale)?)?
            } else {
                noise_pred
            };
            latents = scheduler.step(&noise_pred, timestep, &latents)?;
        }

        let decoded = self.vae.decode(&(&latents / VAE_SCALE)?)?;
        let decoded = ((decoded / 2.0)? + 0.5)?.to_device(&Device::Cpu)?;
        let decoded = (decoded.clamp(0f32, 1.0)? * 255.0)?
            .to_dtype(DType::U8)?
            .i(0)?;
        let (_, out_h, out_w) = decoded.dims3()?;
        let data = decoded.permute((1, 2, 0))?.flatten_all()?.to_vec1::<u8>()?;
        let rendered = RgbImage::from_raw(out_w as u32, out_h as u32, data)
            .ok_or_else(|| candle_core::Error::Msg("decoded buffer has the wrong size".into()))?;

        Ok(imageops::resize(&rendered, orig_w, orig_h, FilterType::Lanczos3))
    }
}

impl InpaintModel for CandleInpaintModel {
    fn inpaint(&mut self, request: &InpaintRequest<'_>) -> Result<RgbImage, InferenceError> {
        self.generate(request)
            .map_err(|e| InferenceError::Inpainting(e.to_string()))
    }
}
