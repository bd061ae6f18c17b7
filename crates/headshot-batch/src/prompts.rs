use std::{path::Path, sync::Arc};

use headshot_common::{HeadshotError, Result};

use crate::queue::QueuedJob;

const BUILTIN_PROMPTS: [&str; 20] = [
    "A professional studio headshot of the person in the photo. The background is a blurred, modern office setting. They are wearing a black formal blazer and have a natural, professional posture suitable for a LinkedIn profile. 1:1 aspect ratio, square format. The image should be 8K resolution, with DSLR quality lighting and detail.",
    "A professional headshot of the person in the photo, wearing a dark navy blue suit jacket. The background is an out-of-focus architectural setting. They have a confident, approachable expression. 1:1 aspect ratio, square format. Render in high-resolution, DSLR quality.",
    "A headshot of the person in the photo wearing a charcoal grey blazer, set against a soft, neutral grey studio backdrop. The person is looking directly at the camera with a slight, confident smile. 1:1 aspect ratio, square format. 8K quality.",
    "A professional headshot of the person wearing a crisp white button-down shirt (no jacket). The background is a warm, soft-lit interior with blurred indoor plants. The pose is relaxed yet professional. 1:1 aspect ratio, square format. DSLR quality.",
    "A minimalist, professional headshot of the person in the photo wearing a black turtleneck sweater against a clean, dark background. Their expression is thoughtful and engaging. 1:1 aspect ratio, square format. High-resolution.",
    "A bright, airy headshot of the person in the photo. They are wearing a professional blouse, and the background is a modern office with large, light-filled windows blurred behind them. The expression is a genuine smile. 1:1 aspect ratio, square format.",
    "A high-resolution, DSLR-quality headshot of the person in the photo. Attire: black formal blazer. Background: softly blurred office. Pose: natural and professional for a corporate profile. 1:1 aspect ratio, square format.",
    "A professional headshot. The person is wearing a dark grey suit jacket and is set against a clean, minimalist wall. Their posture is upright and confident. 1:1 aspect ratio, square format. Render with sharp, clear detail.",
    "A friendly headshot of the person in the photo. They are wearing a navy blue blazer over a light blue shirt. The background is a blurred co-working space, giving a modern, collaborative feel. The expression is open and welcoming. 1:1 aspect ratio, square format.",
    "A poised and self-assured headshot of the person wearing a formal business dress. The background is a subtle, abstract design with cool tones. 1:1 aspect ratio, square format. High-resolution, studio quality.",
    "A headshot depicting the person in a black blazer, standing in front of a blurred bookshelf. The image should convey intelligence and capability. 1:1 aspect ratio, square format. DSLR quality.",
    "A professional headshot of the person in the photo, illuminated with soft, flattering butterfly lighting. Attire: black formal blazer. Background: simple, out-of-focus office. 1:1 aspect ratio, square format. 8K resolution.",
    "A corporate headshot where the person is angled slightly away from the camera, looking back towards it with a confident expression. Attire: dark grey suit. Background: blurred office environment. 1:1 aspect ratio, square format.",
    "An engaging headshot where the person is leaning slightly forward. They are wearing a charcoal grey blazer against a bright, clean background. The image feels dynamic and approachable. 1:1 aspect ratio, square format.",
    "A classic, traditional head-and-shoulders corporate headshot. The person is wearing a classic black suit against a neutral studio background. The lighting is balanced and professional. 1:1 aspect ratio, square format.",
    "A professional headshot with a blurred background suggesting a modern building's exterior (e.g., glass and steel). The person is wearing a black blazer, and the lighting looks natural and bright. 1:1 aspect ratio, square format.",
    "A professional headshot with warm, golden hour style lighting, giving it a slightly more creative and warm feel. Attire is a navy blue blazer. The background is indistinct and softly blurred. 1:1 aspect ratio, square format.",
    "A headshot of the person wearing a professional blouse. The background is a simple, light-colored wall with a single piece of abstract art completely blurred out, adding a touch of sophistication. 1:1 aspect ratio, square format.",
    "A professional headshot that feels more candid and approachable. The person is captured with a slight, genuine laugh. Attire: black blazer. Background: blurred modern office. 1:1 aspect ratio, square format.",
    "A very clean, high-key studio headshot of the person in the photo. They are wearing a black blazer, and the background is pure white or very light grey, softly and evenly lit. 1:1 aspect ratio, square format. 8K, DSLR quality.",
];

/// The ordered prompt list a batch runs over. Job `i` always uses prompt `i`.
#[derive(Debug, Clone)]
pub struct PromptSet {
    prompts: Arc<[Arc<str>]>,
}

impl PromptSet {
    pub fn new(prompts: Vec<String>) -> Result<Self> {
        if prompts.is_empty() {
            return Err(HeadshotError::InvalidArgument(
                "prompt set must contain at least one prompt".to_string(),
            ));
        }
        if let Some(position) = prompts.iter().position(|prompt| prompt.trim().is_empty()) {
            return Err(HeadshotError::InvalidArgument(format!(
                "prompt {position} is empty"
            )));
        }

        Ok(Self {
            prompts: prompts.into_iter().map(Arc::from).collect(),
        })
    }

    pub fn builtin() -> Self {
        Self {
            prompts: BUILTIN_PROMPTS.iter().map(|prompt| Arc::from(*prompt)).collect(),
        }
    }

    /// Loads a JSON array of prompt strings.
    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let prompts = serde_json::from_slice::<Vec<String>>(&bytes).map_err(|err| {
            HeadshotError::InvalidArgument(format!(
                "failed to parse prompt file {}: {err}",
                path.display()
            ))
        })?;
        Self::new(prompts)
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Arc<str>> {
        self.prompts.get(index).cloned()
    }

    pub fn prompt(&self, index: usize) -> Result<Arc<str>> {
        self.get(index).ok_or(HeadshotError::JobNotFound(index))
    }

    pub fn jobs(&self) -> Vec<QueuedJob> {
        self.prompts
            .iter()
            .enumerate()
            .map(|(index, prompt)| QueuedJob::new(index, Arc::clone(prompt)))
            .collect()
    }
}

impl Default for PromptSet {
    fn default() -> Self {
        Self::builtin()
    }
}
