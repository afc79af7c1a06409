//! Frame pipeline tests spanning the scene graph, render queue and rendering technique
