pub mod detection_clusterer;
pub mod face_classifier;
