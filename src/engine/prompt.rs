//! Transform instruction text, selected by visualization mode
//!
//! The reference images travel alongside the prompt in a fixed order (room,
//! floor material, wall material), so the instructions refer to them by
//! position.

use crate::domain::VisualizationMode;

const FLOOR_PROMPT: &str = "Replace only the floor in the room using the second image as the floor material. \
Keep the walls, ceiling, furniture, lighting, shadows, and all objects exactly the same. \
Do not modify room geometry or change perspective. \
Apply the new material realistically: \
- Match the original floor perspective and angle. \
- Blend it naturally with the room lighting. \
- Keep furniture shadows and contact points intact. \
- Do not distort or alter any objects. \
Do not change anything except the floor surface.";

const WALLS_PROMPT: &str = "Replace only the visible walls in the room using the second image as the wall material. \
Do not modify the floor, furniture, windows, ceiling, or any objects. \
Keep the room structure exactly the same: \
- Maintain original lighting and shadows on the wall. \
- Preserve edges around windows, doors, and ceiling lines. \
- Apply the new material cleanly without affecting other areas. \
The result should look like the new wall material was installed in the real room.";

const BOTH_PROMPT: &str = "Replace the floor using the second image, and replace the walls using the third image. \
Do not change any other part of the room. \
Keep the original room structure: \
- Preserve furniture, decor, windows, ceiling, lights, shadows, and reflections. \
- Maintain correct perspective for both floor and walls. \
- Blend materials naturally with room lighting. \
Only change the floor and wall surfaces. Everything else must remain untouched.";

/// Instruction text for the given mode
pub fn build_prompt(mode: VisualizationMode) -> &'static str {
    match mode {
        VisualizationMode::Floor => FLOOR_PROMPT,
        VisualizationMode::Walls => WALLS_PROMPT,
        VisualizationMode::Both => BOTH_PROMPT,
    }
}
