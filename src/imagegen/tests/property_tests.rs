use super::helpers::*;
use crate::imagegen::interface::{AspectRatio, GenerationRequest, ImageGenProvider, ProviderId};
use proptest::prelude::*;

fn aspect_ratio() -> impl Strategy<Value = AspectRatio> {
    prop_oneof![
        Just(AspectRatio::Square),
        Just(AspectRatio::Landscape),
        Just(AspectRatio::Portrait),
    ]
}

proptest! {
    #[test]
    fn prop_request_invariants_hold(
        prompt in ".{0,40}",
        samples in 0u32..16,
        strength in -2.0f32..3.0,
        ratio in aspect_ratio(),
    ) {
        let request = GenerationRequest::image_to_image(prompt.clone(), "/tmp/in.png", samples, ratio, strength);
        prop_assert!(request.sample_count >= 1);
        prop_assert!((0.0..=1.0).contains(&request.strength));
        prop_assert!(request.is_image_to_image());

        let text = GenerationRequest::text_to_image(prompt, samples, ratio);
        prop_assert!(text.sample_count >= 1);
        prop_assert!(!text.is_image_to_image());
    }

    #[test]
    fn prop_sample_prompts_carry_variation_marker(prompt in "[a-z ]{1,30}", index in 0u32..8) {
        let request = GenerationRequest::text_to_image(prompt.clone(), 8, AspectRatio::Square);
        let sample = request.sample_prompt(index);
        prop_assert!(sample.starts_with(&prompt));
        let marker = format!("Variation {}.", index + 1);
        prop_assert!(sample.ends_with(&marker));
    }

    #[test]
    fn prop_results_never_exceed_sample_count(
        samples in 1u32..6,
        empty_mask in proptest::collection::vec(any::<bool>(), 6),
    ) {
        let mask = empty_mask.clone();
        let provider = ScriptedProvider::new(ProviderId::Gemini, move |i| {
            if mask[i] { Ok(vec![]) } else { Ok(vec![tagged_image(i)]) }
        });
        let request = GenerationRequest::text_to_image("a red fox", samples, AspectRatio::Square);

        let rt = tokio::runtime::Runtime::new().unwrap();
        let images = rt.block_on(provider.generate(&request)).unwrap();

        let expected: Vec<u8> = (0..samples as usize)
            .filter(|i| !empty_mask[*i])
            .map(|i| i as u8)
            .collect();
        prop_assert!(images.len() <= samples as usize);
        prop_assert_eq!(images.iter().map(|img| img.data[0]).collect::<Vec<_>>(), expected);
        prop_assert_eq!(provider.calls(), samples as usize);
    }
}

#[test]
fn test_aspect_ratio_tokens() {
    assert_eq!(AspectRatio::Square.ratio_token(), "1:1");
    assert_eq!(AspectRatio::Landscape.ratio_token(), "16:9");
    assert_eq!(AspectRatio::Portrait.ratio_token(), "9:16");
    assert!(AspectRatio::Landscape.composition_hint().contains("landscape composition (16:9)"));
    assert_eq!(AspectRatio::Portrait.label(), "portrait");
}

#[test]
fn test_provider_id_parsing() {
    assert_eq!("Stability".parse::<ProviderId>().unwrap(), ProviderId::Stability);
    assert_eq!(" monster ".parse::<ProviderId>().unwrap(), ProviderId::Monster);
    assert!("openai".parse::<ProviderId>().is_err());
    assert_eq!(serde_json::to_string(&ProviderId::Gemini).unwrap(), "\"gemini\"");
}
